//! CRC-16/XMODEM (polynomial 0x1021, seed 0, no reflection)

use crate::header::{set_crc_flag, CRC_SIZE};
use sensorhub_core::{HubError, HubResult};

/// CRC of `bytes`, byte-wise without a lookup table
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, &b| {
        let mut x = ((crc >> 8) ^ b as u16) & 0xFF;
        x ^= x >> 4;
        (crc << 8) ^ (x << 12) ^ (x << 5) ^ x
    })
}

/// Set the CRC flag, then append the big-endian CRC of `packet[..len]`
///
/// Returns the new packet length.
pub fn append_crc(packet: &mut [u8], len: usize) -> HubResult<usize> {
    if len == 0 || packet.len() < len + CRC_SIZE {
        return Err(HubError::BufferTooSmall);
    }
    set_crc_flag(packet);
    let crc = crc16_ccitt(&packet[..len]);
    packet[len..len + CRC_SIZE].copy_from_slice(&crc.to_be_bytes());
    Ok(len + CRC_SIZE)
}

/// Compare the trailing CRC of a `size`-byte packet against its contents
pub fn crc_matches(packet: &[u8], size: usize) -> bool {
    if size < CRC_SIZE || packet.len() < size {
        return false;
    }
    let body = size - CRC_SIZE;
    let stored = u16::from_be_bytes([packet[body], packet[body + 1]]);
    crc16_ccitt(&packet[..body]) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x31C3);
        assert_eq!(crc16_ccitt(&[]), 0);
    }

    #[test]
    fn test_append_sets_flag_first() {
        let mut packet = [0x10, 0x01, 0x00, 0x0F, 0, 0];
        let len = append_crc(&mut packet, 4).unwrap();
        assert_eq!(len, 6);
        assert_eq!(packet[0], 0x18);
        let crc = crc16_ccitt(&[0x18, 0x01, 0x00, 0x0F]);
        assert_eq!(&packet[4..], &crc.to_be_bytes());
        assert!(crc_matches(&packet, 6));
    }

    #[test]
    fn test_append_needs_room() {
        let mut packet = [0u8; 5];
        assert_eq!(append_crc(&mut packet, 4), Err(HubError::BufferTooSmall));
    }
}
