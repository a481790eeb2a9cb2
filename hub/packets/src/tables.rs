//! Descriptor tables driving the codec
//!
//! Field widths, formats and sizes of every packet kind come from here and
//! nowhere else.

use sensorhub_core::{HubError, HubResult, SensorType, NUM_SENSOR_TYPE};

use crate::header::{DataSize, Format, PacketId, TimestampSize, CTRL_PKT_HEADER_SIZE};

/// Layout family of a sensor data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorPacketType {
    Raw = 0,
    Uncalibrated = 1,
    Calibrated = 2,
    Quaternion = 3,
    Orientation = 4,
    ThreeAxis = 5,
    SignificantMotion = 6,
    StepCounter = 7,
    StepDetector = 8,
}

/// Wire layout of one sensor packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPktDesc {
    pub big_endian: bool,
    pub element_size: u8,
    pub num_elements: u8,
    pub data_format: Format,
    pub time_format: Format,
    pub data_size: DataSize,
    pub timestamp_size: TimestampSize,
    /// Packet size without CRC (uncalibrated: without the offset block)
    pub size_sans_crc: u8,
}

const fn sensor_desc(
    big_endian: bool,
    element_size: u8,
    num_elements: u8,
    data_format: Format,
    time_format: Format,
    data_size: DataSize,
    timestamp_size: TimestampSize,
) -> SensorPktDesc {
    SensorPktDesc {
        big_endian,
        element_size,
        num_elements,
        data_format,
        time_format,
        data_size,
        timestamp_size,
        size_sans_crc: 3 + timestamp_size.bytes() as u8 + element_size * num_elements,
    }
}

use DataSize::{Bits16, Bits32, Bits64, Bits8};
use Format::{FixedPoint, Raw};
use TimestampSize::{Bits32 as Ts32, Bits64 as Ts64};

pub const SENSOR_PACKET_DESCRIPTIONS: [SensorPktDesc; 9] = [
    sensor_desc(true, 2, 3, Raw, Raw, Bits16, Ts32),
    sensor_desc(true, 4, 3, FixedPoint, FixedPoint, Bits32, Ts64),
    sensor_desc(true, 4, 3, FixedPoint, FixedPoint, Bits32, Ts64),
    sensor_desc(true, 4, 4, FixedPoint, FixedPoint, Bits32, Ts64),
    sensor_desc(true, 4, 3, FixedPoint, FixedPoint, Bits32, Ts64),
    sensor_desc(true, 4, 3, FixedPoint, FixedPoint, Bits32, Ts64),
    sensor_desc(false, 1, 1, Raw, FixedPoint, Bits8, Ts64),
    sensor_desc(true, 8, 1, Raw, FixedPoint, Bits64, Ts64),
    sensor_desc(false, 1, 1, Raw, FixedPoint, Bits8, Ts64),
];

impl SensorPacketType {
    pub const fn desc(self) -> &'static SensorPktDesc {
        &SENSOR_PACKET_DESCRIPTIONS[self as usize]
    }

    /// Bytes of the offset block appended to uncalibrated data
    pub const fn offset_block_size(self) -> usize {
        match self {
            SensorPacketType::Uncalibrated => 12,
            _ => 0,
        }
    }
}

use SensorPacketType as Spt;

/// Packet type each sensor reports with; `None` for sensors without one
const SENSOR_TO_PACKET_TYPE: [Option<SensorPacketType>; NUM_SENSOR_TYPE] = [
    None,                         // META_DATA
    Some(Spt::Calibrated),        // ACCELEROMETER
    Some(Spt::Calibrated),        // GEOMAGNETIC_FIELD
    Some(Spt::Orientation),       // ORIENTATION
    Some(Spt::Calibrated),        // GYROSCOPE
    None,                         // LIGHT
    None,                         // PRESSURE
    None,                         // TEMPERATURE
    None,                         // PROXIMITY
    Some(Spt::ThreeAxis),         // GRAVITY
    Some(Spt::ThreeAxis),         // LINEAR_ACCELERATION
    Some(Spt::Quaternion),        // ROTATION_VECTOR
    None,                         // RELATIVE_HUMIDITY
    None,                         // AMBIENT_TEMPERATURE
    Some(Spt::Uncalibrated),      // MAGNETIC_FIELD_UNCALIBRATED
    Some(Spt::Quaternion),        // GAME_ROTATION_VECTOR
    Some(Spt::Uncalibrated),      // GYROSCOPE_UNCALIBRATED
    Some(Spt::SignificantMotion), // SIGNIFICANT_MOTION
    Some(Spt::StepDetector),      // STEP_DETECTOR
    Some(Spt::StepCounter),       // STEP_COUNTER
    Some(Spt::Quaternion),        // GEOMAGNETIC_ROTATION_VECTOR
    None,                         // DEBUG_TUNNEL
    Some(Spt::Raw),               // ACCELEROMETER_RAW
    Some(Spt::Raw),               // MAGNETIC_FIELD_RAW
    Some(Spt::Raw),               // GYROSCOPE_RAW
    None,                         // LIGHT_UV
    None,                         // LIGHT_RGB
    None,                         // STEP
    Some(Spt::Uncalibrated),      // ACCELEROMETER_UNCALIBRATED
    None,                         // PRIVATE_ORIENTATION
    None,                         // CONTEXT_DEVICE_MOTION
    None,                         // CONTEXT_CARRY
    None,                         // CONTEXT_POSTURE
    None,                         // CONTEXT_TRANSPORT
    None,                         // GESTURE_EVENT
    None,                         // HEART_RATE
    None,                         // SYSTEM_REAL_TIME_CLOCK
    None,                         // MAGNETIC_FIELD_ANOMALY
];

/// Sensors whose packets are tagged as wake-up events on the wire
const SENSOR_IS_WAKEUP: [bool; NUM_SENSOR_TYPE] = {
    let mut table = [false; NUM_SENSOR_TYPE];
    table[SensorType::PROXIMITY.0 as usize] = true;
    table[SensorType::ACCELEROMETER_UNCALIBRATED.0 as usize] = true;
    table
};

/// Packet type for a sensor
///
/// `InvalidParameter` for sensor types out of range, `UnsupportedFeature`
/// for known sensors without a packet layout.
pub fn sensor_packet_type(sensor: SensorType) -> HubResult<SensorPacketType> {
    let index = sensor.index().ok_or(HubError::InvalidParameter)?;
    SENSOR_TO_PACKET_TYPE[index].ok_or(HubError::UnsupportedFeature)
}

pub fn is_wakeup_sensor_type(sensor: SensorType) -> HubResult<bool> {
    let index = sensor.index().ok_or(HubError::InvalidParameter)?;
    Ok(SENSOR_IS_WAKEUP[index])
}

/// Control parameter identifier (fourth header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u8);

impl ParamId {
    pub const ERROR_CODE_IN_DATA: Self = Self(0x00);
    pub const ENABLE: Self = Self(0x01);
    pub const BATCH: Self = Self(0x02);
    pub const FLUSH: Self = Self(0x03);
    pub const RANGE_RESOLUTION: Self = Self(0x04);
    pub const POWER: Self = Self(0x05);
    pub const MINMAX_DELAY: Self = Self(0x06);
    pub const FIFO_EVT_CNT: Self = Self(0x07);
    pub const AXIS_MAPPING: Self = Self(0x08);
    pub const CONVERSION_OFFSET: Self = Self(0x09);
    pub const CONVERSION_SCALE: Self = Self(0x0A);
    pub const SENSOR_NOISE: Self = Self(0x0B);
    pub const TIMESTAMP_OFFSET: Self = Self(0x0C);
    pub const ONTIME_WAKETIME: Self = Self(0x0D);
    pub const HPF_LPF_CUTOFF: Self = Self(0x0E);
    pub const SENSOR_NAME: Self = Self(0x0F);
    pub const XYZ_OFFSET: Self = Self(0x10);
    pub const F_SKOR_MATRIX: Self = Self(0x11);
    pub const F_CAL_OFFSET: Self = Self(0x12);
    pub const F_NONLINEAR_EFFECTS: Self = Self(0x13);
    pub const BIAS_STABILITY: Self = Self(0x14);
    pub const REPEATABILITY: Self = Self(0x15);
    pub const TEMP_COEFF: Self = Self(0x16);
    pub const SHAKE_SUSCEPTIBILITY: Self = Self(0x17);
    pub const EXPECTED_NORM: Self = Self(0x18);
    pub const VERSION: Self = Self(0x19);
    pub const DYNAMIC_CAL_SCALE: Self = Self(0x1A);
    pub const DYNAMIC_CAL_SKEW: Self = Self(0x1B);
    pub const DYNAMIC_CAL_OFFSET: Self = Self(0x1C);
    pub const DYNAMIC_CAL_ROTATION: Self = Self(0x1D);
    pub const DYNAMIC_CAL_QUALITY: Self = Self(0x1E);
    pub const DYNAMIC_CAL_SOURCE: Self = Self(0x1F);
    pub const CONFIG_DONE: Self = Self(0x20);
    pub const SH_TIME_SET: Self = Self(0x21);
    pub const TIME_SYNC_START: Self = Self(0x22);
    pub const TIME_SYNC_FOLLOW_UP: Self = Self(0x23);
    pub const TIME_SYNC_END: Self = Self(0x24);

    /// Number of parameter ids
    pub const COUNT: usize = 0x25;

    pub const fn is_valid(self) -> bool {
        (self.0 as usize) < Self::COUNT
    }

    /// Descriptor of a valid parameter
    pub fn desc(self) -> HubResult<&'static CtrlPktDesc> {
        CONTROL_PACKET_DESCRIPTIONS
            .get(self.0 as usize)
            .ok_or(HubError::InvalidParameter)
    }
}

/// Read/write direction allowed, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

/// Payload layout of one control parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlPktDesc {
    pub big_endian: bool,
    pub element_size: u8,
    pub num_elements: u8,
    pub access: Access,
}

impl CtrlPktDesc {
    pub const fn payload_size(&self) -> usize {
        self.element_size as usize * self.num_elements as usize
    }
}

const fn ctrl(big_endian: bool, element_size: u8, num_elements: u8, access: Access) -> CtrlPktDesc {
    CtrlPktDesc {
        big_endian,
        element_size,
        num_elements,
        access,
    }
}

use Access::{Read as R, ReadWrite as RW, Write as W};

pub const CONTROL_PACKET_DESCRIPTIONS: [CtrlPktDesc; ParamId::COUNT] = [
    ctrl(true, 4, 1, R),    // 0x00 error code in data
    ctrl(false, 1, 1, W),   // 0x01 enable
    ctrl(true, 8, 2, W),    // 0x02 batch
    ctrl(false, 0, 0, W),   // 0x03 flush
    ctrl(true, 4, 2, R),    // 0x04 range and resolution
    ctrl(true, 4, 1, R),    // 0x05 power
    ctrl(true, 4, 2, R),    // 0x06 min/max delay
    ctrl(true, 4, 2, R),    // 0x07 FIFO event count
    ctrl(false, 1, 3, RW),  // 0x08 axis mapping
    ctrl(true, 4, 3, RW),   // 0x09 conversion offset
    ctrl(true, 4, 3, RW),   // 0x0A conversion scale
    ctrl(true, 4, 3, RW),   // 0x0B sensor noise
    ctrl(true, 4, 1, RW),   // 0x0C timestamp offset
    ctrl(true, 4, 2, RW),   // 0x0D on-time / wake time
    ctrl(true, 2, 2, RW),   // 0x0E HPF/LPF cutoff
    ctrl(false, 1, 32, R),  // 0x0F sensor name
    ctrl(true, 4, 3, RW),   // 0x10 XYZ offset
    ctrl(true, 4, 9, RW),   // 0x11 factory skew/orthogonality/rotation
    ctrl(true, 4, 3, RW),   // 0x12 factory calibration offset
    ctrl(true, 2, 12, RW),  // 0x13 factory nonlinear effects
    ctrl(true, 4, 3, RW),   // 0x14 bias stability
    ctrl(true, 4, 3, RW),   // 0x15 repeatability
    ctrl(true, 2, 6, RW),   // 0x16 temperature coefficients
    ctrl(true, 2, 3, RW),   // 0x17 shake susceptibility
    ctrl(true, 4, 1, RW),   // 0x18 expected norm
    ctrl(false, 1, 32, R),  // 0x19 version
    ctrl(true, 4, 3, RW),   // 0x1A dynamic cal scale
    ctrl(true, 4, 3, RW),   // 0x1B dynamic cal skew
    ctrl(true, 4, 3, RW),   // 0x1C dynamic cal offset
    ctrl(true, 4, 3, RW),   // 0x1D dynamic cal rotation
    ctrl(true, 4, 3, RW),   // 0x1E dynamic cal quality
    ctrl(false, 1, 1, RW),  // 0x1F dynamic cal source
    ctrl(false, 0, 0, W),   // 0x20 config done
    ctrl(true, 8, 1, W),    // 0x21 hub time set
    ctrl(false, 0, 0, W),   // 0x22 time sync start
    ctrl(true, 8, 1, W),    // 0x23 time sync follow-up
    ctrl(true, 8, 1, W),    // 0x24 time sync end
];

/// How the payload size of a control packet is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeKind {
    FromTable,
    Zero,
    Illegal,
}

/// `[packet kind][access]`: read requests carry no payload, write requests
/// carry the parameter, responses carry it for readable parameters
const CONTROL_PACKET_SIZE_KINDS: [[SizeKind; 3]; 3] = [
    //  Read              Write               ReadWrite
    [SizeKind::Zero, SizeKind::Illegal, SizeKind::Zero],
    [SizeKind::Illegal, SizeKind::FromTable, SizeKind::FromTable],
    [SizeKind::FromTable, SizeKind::Zero, SizeKind::FromTable],
];

/// Payload bytes of a control packet, excluding header and CRC
///
/// `InvalidParameter` when the packet id is not a control id, the parameter
/// is unknown, or the direction is not allowed for the parameter.
pub fn control_payload_size(packet_id: PacketId, param: ParamId) -> HubResult<usize> {
    let row = match packet_id {
        PacketId::ControlReqRead => 0,
        PacketId::ControlReqWrite => 1,
        PacketId::ControlResp => 2,
        _ => return Err(HubError::InvalidParameter),
    };
    let desc = param.desc()?;
    let column = match desc.access {
        Access::Read => 0,
        Access::Write => 1,
        Access::ReadWrite => 2,
    };
    match CONTROL_PACKET_SIZE_KINDS[row][column] {
        SizeKind::FromTable => Ok(desc.payload_size()),
        SizeKind::Zero => Ok(0),
        SizeKind::Illegal => Err(HubError::InvalidParameter),
    }
}

/// Size of a control packet without CRC
pub fn control_packet_size(packet_id: PacketId, param: ParamId) -> HubResult<usize> {
    Ok(CTRL_PKT_HEADER_SIZE + control_payload_size(packet_id, param)?)
}

/// A write request that changes hub configuration
pub fn is_write_config_command(packet_id: PacketId, param: ParamId) -> bool {
    packet_id == PacketId::ControlReqWrite
        && param
            .desc()
            .map(|d| matches!(d.access, Access::Write | Access::ReadWrite))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_packet_sizes() {
        assert_eq!(Spt::Raw.desc().size_sans_crc, 13);
        assert_eq!(Spt::Uncalibrated.desc().size_sans_crc, 23);
        assert_eq!(Spt::Calibrated.desc().size_sans_crc, 23);
        assert_eq!(Spt::Quaternion.desc().size_sans_crc, 27);
        assert_eq!(Spt::SignificantMotion.desc().size_sans_crc, 12);
        assert_eq!(Spt::StepCounter.desc().size_sans_crc, 19);
        assert_eq!(Spt::StepDetector.desc().size_sans_crc, 12);
    }

    #[test]
    fn test_sensor_to_packet_type() {
        assert_eq!(sensor_packet_type(SensorType::ACCELEROMETER), Ok(Spt::Calibrated));
        assert_eq!(
            sensor_packet_type(SensorType::GYROSCOPE_RAW.private()),
            Ok(Spt::Raw)
        );
        assert_eq!(
            sensor_packet_type(SensorType::LIGHT),
            Err(HubError::UnsupportedFeature)
        );
        assert_eq!(
            sensor_packet_type(SensorType::new(60)),
            Err(HubError::InvalidParameter)
        );
    }

    #[test]
    fn test_control_size_kinds() {
        use PacketId::*;
        assert_eq!(control_payload_size(ControlReqRead, ParamId::SENSOR_NAME), Ok(0));
        assert_eq!(control_payload_size(ControlResp, ParamId::SENSOR_NAME), Ok(32));
        assert_eq!(control_payload_size(ControlReqWrite, ParamId::BATCH), Ok(16));
        assert_eq!(control_payload_size(ControlResp, ParamId::BATCH), Ok(0));
        assert_eq!(
            control_payload_size(ControlReqRead, ParamId::ENABLE),
            Err(HubError::InvalidParameter)
        );
        assert_eq!(
            control_payload_size(ControlReqWrite, ParamId::VERSION),
            Err(HubError::InvalidParameter)
        );
        assert_eq!(control_payload_size(ControlResp, ParamId::ERROR_CODE_IN_DATA), Ok(4));
        assert_eq!(control_payload_size(ControlReqWrite, ParamId::F_SKOR_MATRIX), Ok(36));
        assert_eq!(
            control_payload_size(SensorData, ParamId::ENABLE),
            Err(HubError::InvalidParameter)
        );
    }

    #[test]
    fn test_write_config_command() {
        assert!(is_write_config_command(PacketId::ControlReqWrite, ParamId::ENABLE));
        assert!(is_write_config_command(PacketId::ControlReqWrite, ParamId::AXIS_MAPPING));
        assert!(!is_write_config_command(PacketId::ControlReqWrite, ParamId::VERSION));
        assert!(!is_write_config_command(PacketId::ControlReqRead, ParamId::ENABLE));
    }
}
