//! Latest-value cache for non-wakeup on-change sensors

use sensorhub_core::{HubError, HubResult, SensorType};
use sensorhub_packets::MAX_HIF_PACKET_SIZE;

/// Number of on-change sensors whose last sample is kept
pub const NUM_ONCHANGE_NONWAKEUP_SENSOR: usize = 10;

#[derive(Clone, Copy)]
struct Slot {
    sensor: SensorType,
    len: usize,
    packet: [u8; MAX_HIF_PACKET_SIZE],
}

/// Bounded cache keyed by sensor type
///
/// The non-wakeup queue drains into the host first; once it runs dry the
/// cached samples are replayed one by one, and the cache reports empty after
/// a full pass until a new sample arrives.
pub struct OnChangeCache {
    slots: [Option<Slot>; NUM_ONCHANGE_NONWAKEUP_SENSOR],
    cursor: usize,
    empty: bool,
}

impl OnChangeCache {
    pub const fn new() -> Self {
        Self {
            slots: [None; NUM_ONCHANGE_NONWAKEUP_SENSOR],
            cursor: 0,
            empty: true,
        }
    }

    /// Replace the sample of `sensor`, or take the first free slot
    pub fn upsert(&mut self, sensor: SensorType, packet: &[u8]) -> HubResult<()> {
        if packet.len() > MAX_HIF_PACKET_SIZE {
            return Err(HubError::BufferTooSmall);
        }
        let base = sensor.base();
        let index = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.sensor == base))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .ok_or(HubError::InvalidParameter)?;

        let mut slot = Slot {
            sensor: base,
            len: packet.len(),
            packet: [0; MAX_HIF_PACKET_SIZE],
        };
        slot.packet[..packet.len()].copy_from_slice(packet);
        self.slots[index] = Some(slot);
        self.empty = false;
        Ok(())
    }

    /// Next cached sample of the current pass
    ///
    /// Returns `None` after the last one, marking the cache empty and
    /// rewinding for the next pass.
    pub fn next_replay(&mut self) -> Option<&[u8]> {
        while self.cursor < NUM_ONCHANGE_NONWAKEUP_SENSOR {
            let index = self.cursor;
            self.cursor += 1;
            if self.slots[index].is_some() {
                return self.slots[index].as_ref().map(|s| &s.packet[..s.len]);
            }
        }
        self.empty = true;
        self.cursor = 0;
        None
    }

    /// Drop the sample of `sensor`
    pub fn discard(&mut self, sensor: SensorType) {
        let base = sensor.base();
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(s) if s.sensor == base) {
                *slot = None;
            }
        }
        if self.slots.iter().all(Option::is_none) {
            self.empty = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of sensors with a cached sample
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for OnChangeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_reuses_slot() {
        let mut cache = OnChangeCache::new();
        cache.upsert(SensorType::STEP_COUNTER, &[1, 2, 3]).unwrap();
        cache.upsert(SensorType::STEP_COUNTER, &[4, 5]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.next_replay(), Some(&[4u8, 5][..]));
        assert_eq!(cache.next_replay(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache() {
        let mut cache = OnChangeCache::new();
        for raw in 0..NUM_ONCHANGE_NONWAKEUP_SENSOR as u32 {
            cache.upsert(SensorType::new(raw), &[raw as u8]).unwrap();
        }
        assert_eq!(
            cache.upsert(SensorType::new(30), &[0]),
            Err(HubError::InvalidParameter)
        );
    }

    #[test]
    fn test_replay_passes() {
        let mut cache = OnChangeCache::new();
        cache.upsert(SensorType::LIGHT, &[1]).unwrap();
        cache.upsert(SensorType::PROXIMITY, &[2]).unwrap();

        assert_eq!(cache.next_replay(), Some(&[1u8][..]));
        assert!(!cache.is_empty());
        assert_eq!(cache.next_replay(), Some(&[2u8][..]));
        assert_eq!(cache.next_replay(), None);
        assert!(cache.is_empty());

        // samples stay cached for the next pass
        assert_eq!(cache.next_replay(), Some(&[1u8][..]));
    }

    #[test]
    fn test_discard() {
        let mut cache = OnChangeCache::new();
        cache.upsert(SensorType::STEP_COUNTER, &[1]).unwrap();
        cache.discard(SensorType::STEP_COUNTER);
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
    }
}
