//! Sensor type identifiers

use core::fmt;

/// Number of known sensor types (Android and private)
pub const NUM_SENSOR_TYPE: usize = 38;

/// Number of Android sensor types; private sensors start here
pub const NUM_ANDROID_SENSOR_TYPE: u32 = 21;

/// Bit flagging a sensor type as private (non-Android)
pub const SENSOR_DEVICE_PRIVATE_BASE: u32 = 0x1_0000;

/// Sensor type identifier
///
/// The low bits hold the base type used to index per-sensor tables; bit 16
/// marks a private sensor. Only `base & 0x3F` and the private flag travel on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorType(pub u32);

impl SensorType {
    pub const META_DATA: Self = Self(0);
    pub const ACCELEROMETER: Self = Self(1);
    pub const GEOMAGNETIC_FIELD: Self = Self(2);
    pub const ORIENTATION: Self = Self(3);
    pub const GYROSCOPE: Self = Self(4);
    pub const LIGHT: Self = Self(5);
    pub const PRESSURE: Self = Self(6);
    pub const TEMPERATURE: Self = Self(7);
    pub const PROXIMITY: Self = Self(8);
    pub const GRAVITY: Self = Self(9);
    pub const LINEAR_ACCELERATION: Self = Self(10);
    pub const ROTATION_VECTOR: Self = Self(11);
    pub const RELATIVE_HUMIDITY: Self = Self(12);
    pub const AMBIENT_TEMPERATURE: Self = Self(13);
    pub const MAGNETIC_FIELD_UNCALIBRATED: Self = Self(14);
    pub const GAME_ROTATION_VECTOR: Self = Self(15);
    pub const GYROSCOPE_UNCALIBRATED: Self = Self(16);
    pub const SIGNIFICANT_MOTION: Self = Self(17);
    pub const STEP_DETECTOR: Self = Self(18);
    pub const STEP_COUNTER: Self = Self(19);
    pub const GEOMAGNETIC_ROTATION_VECTOR: Self = Self(20);
    pub const DEBUG_TUNNEL: Self = Self(21);
    pub const ACCELEROMETER_RAW: Self = Self(22);
    pub const MAGNETIC_FIELD_RAW: Self = Self(23);
    pub const GYROSCOPE_RAW: Self = Self(24);
    pub const LIGHT_UV: Self = Self(25);
    pub const LIGHT_RGB: Self = Self(26);
    pub const STEP: Self = Self(27);
    pub const ACCELEROMETER_UNCALIBRATED: Self = Self(28);
    pub const PRIVATE_ORIENTATION: Self = Self(29);
    pub const CONTEXT_DEVICE_MOTION: Self = Self(30);
    pub const CONTEXT_CARRY: Self = Self(31);
    pub const CONTEXT_POSTURE: Self = Self(32);
    pub const CONTEXT_TRANSPORT: Self = Self(33);
    pub const GESTURE_EVENT: Self = Self(34);
    pub const HEART_RATE: Self = Self(35);
    pub const SYSTEM_REAL_TIME_CLOCK: Self = Self(36);
    pub const MAGNETIC_FIELD_ANOMALY: Self = Self(37);

    /// Create a sensor type from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value including the private flag
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Type with the private flag set
    pub const fn private(self) -> Self {
        Self(self.0 | SENSOR_DEVICE_PRIVATE_BASE)
    }

    /// Type with the private flag cleared
    pub const fn base(self) -> Self {
        Self(self.0 & !SENSOR_DEVICE_PRIVATE_BASE)
    }

    /// Check the private flag
    pub const fn is_private(self) -> bool {
        self.0 & SENSOR_DEVICE_PRIVATE_BASE != 0
    }

    /// Table index of the base type, if it is a known sensor
    pub const fn index(self) -> Option<usize> {
        let base = self.base().0 as usize;
        if base < NUM_SENSOR_TYPE {
            Some(base)
        } else {
            None
        }
    }

    /// Check that the base type is a known sensor
    pub const fn is_valid(self) -> bool {
        self.index().is_some()
    }

    /// Six-bit sensor id carried in the packet header
    pub const fn wire_id(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    /// Human readable name of the base type
    pub fn name(self) -> &'static str {
        match self.index() {
            Some(idx) => SENSOR_NAMES[idx],
            None => "UNKNOWN",
        }
    }
}

const SENSOR_NAMES: [&str; NUM_SENSOR_TYPE] = [
    "META_DATA",
    "ACCELEROMETER",
    "GEOMAGNETIC_FIELD",
    "ORIENTATION",
    "GYROSCOPE",
    "LIGHT",
    "PRESSURE",
    "TEMPERATURE",
    "PROXIMITY",
    "GRAVITY",
    "LINEAR_ACCELERATION",
    "ROTATION_VECTOR",
    "RELATIVE_HUMIDITY",
    "AMBIENT_TEMPERATURE",
    "MAGNETIC_FIELD_UNCALIBRATED",
    "GAME_ROTATION_VECTOR",
    "GYROSCOPE_UNCALIBRATED",
    "SIGNIFICANT_MOTION",
    "STEP_DETECTOR",
    "STEP_COUNTER",
    "GEOMAGNETIC_ROTATION_VECTOR",
    "DEBUG_TUNNEL",
    "ACCELEROMETER_RAW",
    "MAGNETIC_FIELD_RAW",
    "GYROSCOPE_RAW",
    "LIGHT_UV",
    "LIGHT_RGB",
    "STEP",
    "ACCELEROMETER_UNCALIBRATED",
    "PRIVATE_ORIENTATION",
    "CONTEXT_DEVICE_MOTION",
    "CONTEXT_CARRY",
    "CONTEXT_POSTURE",
    "CONTEXT_TRANSPORT",
    "GESTURE_EVENT",
    "HEART_RATE",
    "SYSTEM_REAL_TIME_CLOCK",
    "MAGNETIC_FIELD_ANOMALY",
];

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_private() {
            write!(f, "{}(private)", self.name())
        } else {
            write!(f, "{}", self.name())
        }
    }
}

impl From<u32> for SensorType {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorType {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "SensorType({=u32:#x})", self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_flag_roundtrip() {
        let raw = SensorType::ACCELEROMETER_RAW.private();
        assert!(raw.is_private());
        assert_eq!(raw.base(), SensorType::ACCELEROMETER_RAW);
        assert_eq!(raw.index(), Some(22));
        assert_eq!(raw.wire_id(), 22);
    }

    #[test]
    fn test_index_range() {
        assert!(SensorType::MAGNETIC_FIELD_ANOMALY.is_valid());
        assert!(!SensorType::new(NUM_SENSOR_TYPE as u32).is_valid());
        assert_eq!(SensorType::new(99).name(), "UNKNOWN");
        assert_eq!(SensorType::STEP_COUNTER.name(), "STEP_COUNTER");
    }
}
