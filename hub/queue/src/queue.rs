//! Packet queue with edge-triggered threshold notifications

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;
use sensorhub_core::{HubError, HubResult};
use sensorhub_mem::Buffer;

/// Queue marks a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// Last buffer was taken out
    Empty = 0,
    /// Size dropped to the low threshold
    LowThreshold = 1,
    /// Size rose to the high threshold
    HighThreshold = 2,
    /// Size reached capacity
    Full = 3,
}

const NUM_EVENTS: usize = 4;

/// Outcome of a successful enqueue or dequeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Ok,
    /// Low threshold reached and no listener registered for it
    LowThreshold,
    /// High threshold reached and no listener registered for it
    HighThreshold,
}

/// Receiver of queue notifications
///
/// `tag` is the value given at registration, letting one listener serve
/// several queues.
pub trait QueueListener {
    fn on_queue_event(&self, event: QueueEvent, tag: u32);
}

struct QueueInner<const N: usize> {
    items: Deque<Buffer, N>,
    capacity: usize,
    low_threshold: usize,
    high_threshold: usize,
}

/// Bounded FIFO of buffers with room for at most `N` entries
pub struct Queue<'a, const N: usize> {
    inner: Mutex<RefCell<QueueInner<N>>>,
    listeners: [Option<(&'a dyn QueueListener, u32)>; NUM_EVENTS],
}

impl<'a, const N: usize> Queue<'a, N> {
    /// Create a queue holding `capacity` buffers
    ///
    /// Requires `capacity <= N`, both thresholds below capacity and
    /// `low < high`.
    pub fn create(capacity: usize, low_threshold: usize, high_threshold: usize) -> HubResult<Self> {
        if capacity > N
            || capacity <= low_threshold
            || capacity <= high_threshold
            || low_threshold >= high_threshold
        {
            return Err(HubError::InvalidParameter);
        }

        Ok(Self {
            inner: Mutex::new(RefCell::new(QueueInner {
                items: Deque::new(),
                capacity,
                low_threshold,
                high_threshold,
            })),
            listeners: [None; NUM_EVENTS],
        })
    }

    /// Subscribe `listener` to `event`, replacing any previous one
    pub fn register_listener(&mut self, event: QueueEvent, listener: &'a dyn QueueListener, tag: u32) {
        self.listeners[event as usize] = Some((listener, tag));
    }

    /// Append a buffer
    ///
    /// A full queue hands the buffer back untouched.
    pub fn enqueue(&self, buffer: Buffer) -> Result<QueueStatus, Buffer> {
        let crossed = critical_section::with(|cs| {
            let mut q = self.inner.borrow_ref_mut(cs);
            if q.items.len() >= q.capacity {
                return Err(buffer);
            }
            q.items.push_back(buffer)?;

            let size = q.items.len();
            if q.high_threshold < q.capacity && size == q.high_threshold {
                Ok(Some(QueueEvent::HighThreshold))
            } else if size == q.capacity {
                Ok(Some(QueueEvent::Full))
            } else {
                Ok(None)
            }
        })?;

        match crossed {
            Some(QueueEvent::HighThreshold) => {
                if self.notify(QueueEvent::HighThreshold) {
                    Ok(QueueStatus::Ok)
                } else {
                    Ok(QueueStatus::HighThreshold)
                }
            }
            Some(event) => {
                self.notify(event);
                Ok(QueueStatus::Ok)
            }
            None => Ok(QueueStatus::Ok),
        }
    }

    /// Take the oldest buffer
    pub fn dequeue(&self) -> HubResult<(Buffer, QueueStatus)> {
        let (buffer, crossed) = critical_section::with(|cs| {
            let mut q = self.inner.borrow_ref_mut(cs);
            let buffer = q.items.pop_front().ok_or(HubError::QueueEmpty)?;

            let size = q.items.len();
            let crossed = if size == 0 {
                Some(QueueEvent::Empty)
            } else if q.low_threshold > 0 && size == q.low_threshold {
                Some(QueueEvent::LowThreshold)
            } else {
                None
            };
            Ok((buffer, crossed))
        })?;

        let status = match crossed {
            Some(QueueEvent::LowThreshold) => {
                if self.notify(QueueEvent::LowThreshold) {
                    QueueStatus::Ok
                } else {
                    QueueStatus::LowThreshold
                }
            }
            Some(event) => {
                self.notify(event);
                QueueStatus::Ok
            }
            None => QueueStatus::Ok,
        };
        Ok((buffer, status))
    }

    /// Keep only the buffers for which `keep` returns true, in order
    ///
    /// Dropped buffers are passed to `discard`. No threshold is reported
    /// while buffers are moved, only `Empty` if nothing is left afterwards.
    /// Returns the number of buffers discarded.
    pub fn retain(
        &self,
        mut keep: impl FnMut(&Buffer) -> bool,
        mut discard: impl FnMut(Buffer),
    ) -> usize {
        let (removed, emptied) = critical_section::with(|cs| {
            let mut q = self.inner.borrow_ref_mut(cs);
            let before = q.items.len();
            let mut removed = 0;
            for _ in 0..before {
                if let Some(buffer) = q.items.pop_front() {
                    if keep(&buffer) {
                        // Room is guaranteed: the buffer was just taken out.
                        if let Err(buffer) = q.items.push_back(buffer) {
                            discard(buffer);
                            removed += 1;
                        }
                    } else {
                        discard(buffer);
                        removed += 1;
                    }
                }
            }
            (removed, before > 0 && q.items.is_empty())
        });

        if emptied {
            self.notify(QueueEvent::Empty);
        }
        removed
    }

    /// Change the high threshold; it must stay below capacity
    pub fn set_high_threshold(&self, high_threshold: usize) -> HubResult<()> {
        critical_section::with(|cs| {
            let mut q = self.inner.borrow_ref_mut(cs);
            if high_threshold >= q.capacity {
                return Err(HubError::InvalidParameter);
            }
            q.high_threshold = high_threshold;
            Ok(())
        })
    }

    pub fn high_threshold(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).high_threshold)
    }

    pub fn low_threshold(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).low_threshold)
    }

    /// Number of queued buffers
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| {
            let q = self.inner.borrow_ref(cs);
            q.items.len() >= q.capacity
        })
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).capacity)
    }

    fn notify(&self, event: QueueEvent) -> bool {
        match self.listeners[event as usize] {
            Some((listener, tag)) => {
                listener.on_queue_event(event, tag);
                true
            }
            None => false,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QueueEvent {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QueueEvent::Empty => defmt::write!(fmt, "Empty"),
            QueueEvent::LowThreshold => defmt::write!(fmt, "LowThreshold"),
            QueueEvent::HighThreshold => defmt::write!(fmt, "HighThreshold"),
            QueueEvent::Full => defmt::write!(fmt, "Full"),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use sensorhub_mem::BlockPool;
    use std::cell::RefCell as StdRefCell;
    use std::vec::Vec;

    struct Recorder {
        events: StdRefCell<Vec<(QueueEvent, u32)>>,
    }

    impl QueueListener for Recorder {
        fn on_queue_event(&self, event: QueueEvent, tag: u32) {
            self.events.borrow_mut().push((event, tag));
        }
    }

    fn buffer(pool: &BlockPool<256>, byte: u8) -> Buffer {
        pool.alloc_buffer(&[byte]).unwrap()
    }

    fn first_byte(pool: &BlockPool<256>, buffer: &Buffer) -> u8 {
        let mut out = [0u8; 1];
        pool.read_buffer(buffer, &mut out).unwrap();
        out[0]
    }

    #[test]
    fn test_queue_fifo() {
        let pool: BlockPool<256> = BlockPool::new();
        pool.init(8).unwrap();
        let queue: Queue<'_, 4> = Queue::create(4, 0, 3).unwrap();

        for byte in 1..=3 {
            queue.enqueue(buffer(&pool, byte)).unwrap();
        }
        assert_eq!(queue.len(), 3);

        for byte in 1..=3 {
            let (buf, _) = queue.dequeue().unwrap();
            assert_eq!(first_byte(&pool, &buf), byte);
            pool.free_buffer(buf).unwrap();
        }
        assert_eq!(queue.dequeue().unwrap_err(), HubError::QueueEmpty);
    }

    #[test]
    fn test_queue_full_returns_buffer() {
        let pool: BlockPool<256> = BlockPool::new();
        pool.init(8).unwrap();
        let queue: Queue<'_, 2> = Queue::create(2, 0, 1).unwrap();

        queue.enqueue(buffer(&pool, 1)).unwrap();
        queue.enqueue(buffer(&pool, 2)).unwrap();
        assert!(queue.is_full());

        let rejected = queue.enqueue(buffer(&pool, 3)).unwrap_err();
        assert_eq!(first_byte(&pool, &rejected), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_threshold_status_without_listener() {
        let pool: BlockPool<256> = BlockPool::new();
        pool.init(8).unwrap();
        let queue: Queue<'_, 8> = Queue::create(8, 1, 3).unwrap();

        assert_eq!(queue.enqueue(buffer(&pool, 0)).unwrap(), QueueStatus::Ok);
        assert_eq!(queue.enqueue(buffer(&pool, 0)).unwrap(), QueueStatus::Ok);
        assert_eq!(
            queue.enqueue(buffer(&pool, 0)).unwrap(),
            QueueStatus::HighThreshold
        );
        assert_eq!(queue.enqueue(buffer(&pool, 0)).unwrap(), QueueStatus::Ok);

        assert_eq!(queue.dequeue().unwrap().1, QueueStatus::Ok);
        assert_eq!(queue.dequeue().unwrap().1, QueueStatus::Ok);
        assert_eq!(queue.dequeue().unwrap().1, QueueStatus::LowThreshold);
        assert_eq!(queue.dequeue().unwrap().1, QueueStatus::Ok);
    }

    #[test]
    fn test_listeners_fire_once_per_crossing() {
        let pool: BlockPool<256> = BlockPool::new();
        pool.init(8).unwrap();
        let recorder = Recorder {
            events: StdRefCell::new(Vec::new()),
        };
        let mut queue: Queue<'_, 3> = Queue::create(3, 0, 1).unwrap();
        queue.register_listener(QueueEvent::HighThreshold, &recorder, 7);
        queue.register_listener(QueueEvent::Full, &recorder, 7);
        queue.register_listener(QueueEvent::Empty, &recorder, 7);

        for _ in 0..3 {
            assert_eq!(queue.enqueue(buffer(&pool, 0)).unwrap(), QueueStatus::Ok);
        }
        for _ in 0..3 {
            queue.dequeue().unwrap();
        }

        assert_eq!(
            *recorder.events.borrow(),
            [
                (QueueEvent::HighThreshold, 7),
                (QueueEvent::Full, 7),
                (QueueEvent::Empty, 7),
            ]
        );
    }

    #[test]
    fn test_retain_keeps_order() {
        let pool: BlockPool<256> = BlockPool::new();
        pool.init(8).unwrap();
        let queue: Queue<'_, 8> = Queue::create(8, 0, 7).unwrap();
        for byte in [1, 2, 1, 3] {
            queue.enqueue(buffer(&pool, byte)).unwrap();
        }

        let removed = queue.retain(
            |buf| first_byte(&pool, buf) != 1,
            |buf| pool.free_buffer(buf).unwrap(),
        );
        assert_eq!(removed, 2);
        assert_eq!(pool.stats().used_blocks, 2);

        let (a, _) = queue.dequeue().unwrap();
        let (b, _) = queue.dequeue().unwrap();
        assert_eq!(first_byte(&pool, &a), 2);
        assert_eq!(first_byte(&pool, &b), 3);
    }

    #[test]
    fn test_create_rejects_bad_thresholds() {
        assert!(Queue::<4>::create(5, 0, 1).is_err());
        assert!(Queue::<4>::create(4, 4, 1).is_err());
        assert!(Queue::<4>::create(4, 0, 4).is_err());
        assert!(Queue::<4>::create(4, 2, 2).is_err());
        assert!(Queue::<4>::create(4, 0, 1).is_ok());
    }

    #[test]
    fn test_set_high_threshold() {
        let queue: Queue<'_, 4> = Queue::create(4, 0, 1).unwrap();
        assert_eq!(queue.set_high_threshold(4), Err(HubError::InvalidParameter));
        queue.set_high_threshold(3).unwrap();
        assert_eq!(queue.high_threshold(), 3);
    }
}
