#![no_std]
#![forbid(unsafe_code)]

//! # Sensor Hub Core
//!
//! Status codes, sensor identifiers and fixed-point time types shared by the
//! host-interface crates (block pools, queues, packet codec, batching and
//! configuration).

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod sensors;
pub mod time;

pub use sensors::*;
pub use time::*;

/// Sensor hub version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the sensor hub
pub type HubResult<T> = Result<T, HubError>;

/// Error types for host-interface operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Argument out of range or operation not allowed in the current state
    InvalidParameter,
    /// Component used before initialization
    Uninitialized,
    /// Queue has no room left
    QueueFull,
    /// Queue has nothing to hand out
    QueueEmpty,
    /// Block pool exhausted
    MallocFailed,
    /// Sensor type outside the known range
    SensorInvalidType,
    /// Sensor has not been registered for batching
    SensorNotRegistered,
    /// Sensor is already registered for batching
    SensorAlreadyRegistered,
    /// Packet fields do not match what the sensor produces
    SensorUnsupported,
    /// Known but unimplemented feature
    UnsupportedFeature,
    /// CRC mismatch
    InvalidCrc,
    /// Buffer shorter than the packet it should hold
    BufferTooSmall,
    /// Unknown packet identifier
    InvalidPacketId,
    /// Generic failure
    Unspecified,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::InvalidParameter => write!(f, "Invalid parameter"),
            HubError::Uninitialized => write!(f, "Component not initialized"),
            HubError::QueueFull => write!(f, "Queue is full"),
            HubError::QueueEmpty => write!(f, "Queue is empty"),
            HubError::MallocFailed => write!(f, "Block pool exhausted"),
            HubError::SensorInvalidType => write!(f, "Invalid sensor type"),
            HubError::SensorNotRegistered => write!(f, "Sensor not registered"),
            HubError::SensorAlreadyRegistered => write!(f, "Sensor already registered"),
            HubError::SensorUnsupported => write!(f, "Packet not supported for sensor"),
            HubError::UnsupportedFeature => write!(f, "Unsupported feature"),
            HubError::InvalidCrc => write!(f, "CRC mismatch"),
            HubError::BufferTooSmall => write!(f, "Buffer too small"),
            HubError::InvalidPacketId => write!(f, "Invalid packet identifier"),
            HubError::Unspecified => write!(f, "Unspecified error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HubError {}

#[cfg(feature = "defmt")]
impl defmt::Format for HubError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            HubError::InvalidParameter => defmt::write!(fmt, "InvalidParameter"),
            HubError::Uninitialized => defmt::write!(fmt, "Uninitialized"),
            HubError::QueueFull => defmt::write!(fmt, "QueueFull"),
            HubError::QueueEmpty => defmt::write!(fmt, "QueueEmpty"),
            HubError::MallocFailed => defmt::write!(fmt, "MallocFailed"),
            HubError::SensorInvalidType => defmt::write!(fmt, "SensorInvalidType"),
            HubError::SensorNotRegistered => defmt::write!(fmt, "SensorNotRegistered"),
            HubError::SensorAlreadyRegistered => defmt::write!(fmt, "SensorAlreadyRegistered"),
            HubError::SensorUnsupported => defmt::write!(fmt, "SensorUnsupported"),
            HubError::UnsupportedFeature => defmt::write!(fmt, "UnsupportedFeature"),
            HubError::InvalidCrc => defmt::write!(fmt, "InvalidCrc"),
            HubError::BufferTooSmall => defmt::write!(fmt, "BufferTooSmall"),
            HubError::InvalidPacketId => defmt::write!(fmt, "InvalidPacketId"),
            HubError::Unspecified => defmt::write!(fmt, "Unspecified"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        extern crate std;
        use std::string::ToString;

        assert_eq!(HubError::QueueFull.to_string(), "Queue is full");
        assert_eq!(HubError::InvalidCrc.to_string(), "CRC mismatch");
    }

    #[test]
    fn test_error_is_copy() {
        let err = HubError::BufferTooSmall;
        let copy = err;
        assert_eq!(err, copy);
    }
}
