//! Bit-packed packet headers
//!
//! Every packet starts with three bytes:
//!
//! ```text
//! byte 0  control   7: version  6..4: packet id  3: CRC present
//!                   sensor data:  2: data format  1: time format
//!                   control:      2..1: data format
//!                   0: private sensor
//! byte 1  sensor    7..6: metadata  5..0: sensor type
//! byte 2  attribute 7..4: subtype
//!                   sensor data:  3: flush  2..1: data size  0: timestamp size
//!                   control:      3..0: sequence number
//! ```
//!
//! Control packets add a fourth byte holding the parameter id. Sensor data
//! packets continue with the big-endian timestamp at offset 3.

use sensorhub_core::SensorType;

pub const PKT_BASE_HEADER_SIZE: usize = 3;
pub const SENSOR_DATA_PKT_HEADER_SIZE: usize = 3;
pub const CTRL_PKT_HEADER_SIZE: usize = 4;
pub const CRC_SIZE: usize = 2;

/// Largest packet on the wire: a 36-byte control response plus CRC
pub const MAX_HIF_PACKET_SIZE: usize = 42;

/// Offset of the timestamp in sensor data packets
pub const PKT_TIMESTAMP_OFFSET: usize = 3;

pub const PACKET_VERSION_MASK: u8 = 0x80;
pub const PKID_MASK: u8 = 0x70;
pub const PKID_SHIFT: u8 = 4;
pub const PKT_CRC_MASK: u8 = 0x08;
pub const DATA_FORMAT_SENSOR_MASK: u8 = 0x04;
pub const TIME_FORMAT_SENSOR_MASK: u8 = 0x02;
pub const CTRL_PKT_DF_MASK: u8 = 0x06;
pub const PRIVATE_SENSOR_MASK: u8 = 0x01;

pub const SENSOR_METADATA_MASK: u8 = 0xC0;
pub const SENSOR_METADATA_SHIFT: u8 = 6;
pub const SENSOR_TYPE_MASK: u8 = 0x3F;

pub const SENSOR_SUBTYPE_MASK: u8 = 0xF0;
pub const SENSOR_SUBTYPE_SHIFT: u8 = 4;
pub const SENSOR_DATA_FLUSH_MASK: u8 = 0x08;
pub const DATA_SIZE_MASK: u8 = 0x06;
pub const DATA_SIZE_SHIFT: u8 = 1;
pub const TIME_STAMP_SIZE_MASK: u8 = 0x01;
pub const CONTROL_SEQUENCE_MASK: u8 = 0x0F;

/// Metadata value announcing offsets appended to uncalibrated data
pub const META_DATA_OFFSET_CHANGE: u8 = 0x01;
pub const META_DATA_UNUSED: u8 = 0x00;

/// Packet identifier (bits 6..4 of the control byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    SensorData = 0,
    ControlReqRead = 1,
    ControlReqWrite = 2,
    ControlResp = 3,
    TestData = 4,
}

impl PacketId {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(PacketId::SensorData),
            1 => Some(PacketId::ControlReqRead),
            2 => Some(PacketId::ControlReqWrite),
            3 => Some(PacketId::ControlResp),
            4 => Some(PacketId::TestData),
            _ => None,
        }
    }

    /// Value as it appears in the control byte (`0x00`, `0x10`, ...)
    pub const fn wire_value(self) -> u8 {
        (self as u8) << PKID_SHIFT
    }

    pub const fn is_sensor(self) -> bool {
        matches!(self, PacketId::SensorData | PacketId::TestData)
    }

    pub const fn is_control(self) -> bool {
        matches!(
            self,
            PacketId::ControlReqRead | PacketId::ControlReqWrite | PacketId::ControlResp
        )
    }
}

/// Element width of sensor data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataSize {
    Bits8 = 0,
    Bits16 = 1,
    Bits32 = 2,
    Bits64 = 3,
}

impl DataSize {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DataSize::Bits8,
            1 => DataSize::Bits16,
            2 => DataSize::Bits32,
            _ => DataSize::Bits64,
        }
    }
}

/// Width of the sensor data timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimestampSize {
    Bits32 = 0,
    Bits64 = 1,
}

impl TimestampSize {
    pub const fn bytes(self) -> usize {
        match self {
            TimestampSize::Bits32 => 4,
            TimestampSize::Bits64 => 8,
        }
    }
}

/// Raw counts or application defined fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Format {
    Raw = 0,
    FixedPoint = 1,
}

impl Format {
    const fn from_flag(set: bool) -> Self {
        if set {
            Format::FixedPoint
        } else {
            Format::Raw
        }
    }
}

/// Packet id straight from the control byte, `None` if out of range
pub fn packet_id(packet: &[u8]) -> Option<PacketId> {
    packet
        .first()
        .and_then(|b| PacketId::from_bits((b & PKID_MASK) >> PKID_SHIFT))
}

pub fn packet_version(packet: &[u8]) -> u8 {
    packet.first().map_or(0, |b| (b & PACKET_VERSION_MASK) >> 7)
}

pub fn crc_flag(packet: &[u8]) -> bool {
    packet.first().map_or(false, |b| b & PKT_CRC_MASK != 0)
}

pub fn set_crc_flag(packet: &mut [u8]) {
    if let Some(b) = packet.first_mut() {
        *b |= PKT_CRC_MASK;
    }
}

fn sensor_from_wire(control: u8, sensor_byte: u8) -> SensorType {
    let sensor = SensorType::new((sensor_byte & SENSOR_TYPE_MASK) as u32);
    if control & PRIVATE_SENSOR_MASK != 0 {
        sensor.private()
    } else {
        sensor
    }
}

/// Expanded header of a sensor data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorHeader {
    pub packet_id: PacketId,
    pub crc: bool,
    pub data_format: Format,
    pub time_format: Format,
    pub metadata: u8,
    pub sensor: SensorType,
    pub subtype: u8,
    pub flush: bool,
    pub data_size: DataSize,
    pub timestamp_size: TimestampSize,
}

impl SensorHeader {
    /// Write the three header bytes; the CRC flag is left to the CRC writer
    pub fn encode(&self, out: &mut [u8]) {
        let mut control = self.packet_id.wire_value();
        if self.sensor.is_private() {
            control |= PRIVATE_SENSOR_MASK;
        }
        if self.data_format == Format::FixedPoint {
            control |= DATA_FORMAT_SENSOR_MASK;
        }
        if self.time_format == Format::FixedPoint {
            control |= TIME_FORMAT_SENSOR_MASK;
        }

        let mut attribute = (self.subtype << SENSOR_SUBTYPE_SHIFT) & SENSOR_SUBTYPE_MASK;
        if self.flush {
            attribute |= SENSOR_DATA_FLUSH_MASK;
        }
        attribute |= ((self.data_size as u8) << DATA_SIZE_SHIFT) & DATA_SIZE_MASK;
        attribute |= self.timestamp_size as u8 & TIME_STAMP_SIZE_MASK;

        out[0] = control;
        out[1] = ((self.metadata << SENSOR_METADATA_SHIFT) & SENSOR_METADATA_MASK)
            | self.sensor.wire_id();
        out[2] = attribute;
    }

    /// Read the header of a packet at least three bytes long
    pub fn decode(packet: &[u8]) -> Option<Self> {
        if packet.len() < SENSOR_DATA_PKT_HEADER_SIZE {
            return None;
        }
        let (control, sensor, attribute) = (packet[0], packet[1], packet[2]);
        Some(Self {
            packet_id: PacketId::from_bits((control & PKID_MASK) >> PKID_SHIFT)?,
            crc: control & PKT_CRC_MASK != 0,
            data_format: Format::from_flag(control & DATA_FORMAT_SENSOR_MASK != 0),
            time_format: Format::from_flag(control & TIME_FORMAT_SENSOR_MASK != 0),
            metadata: (sensor & SENSOR_METADATA_MASK) >> SENSOR_METADATA_SHIFT,
            sensor: sensor_from_wire(control, sensor),
            subtype: (attribute & SENSOR_SUBTYPE_MASK) >> SENSOR_SUBTYPE_SHIFT,
            flush: attribute & SENSOR_DATA_FLUSH_MASK != 0,
            data_size: DataSize::from_bits((attribute & DATA_SIZE_MASK) >> DATA_SIZE_SHIFT),
            timestamp_size: if attribute & TIME_STAMP_SIZE_MASK != 0 {
                TimestampSize::Bits64
            } else {
                TimestampSize::Bits32
            },
        })
    }
}

/// Expanded header of a control request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub packet_id: PacketId,
    pub crc: bool,
    pub data_format: u8,
    pub sensor: SensorType,
    pub subtype: u8,
    pub sequence: u8,
    pub param: u8,
}

impl ControlHeader {
    /// Write the four header bytes; data format bits are left clear
    pub fn encode(&self, out: &mut [u8]) {
        let mut control = self.packet_id.wire_value();
        if self.sensor.is_private() {
            control |= PRIVATE_SENSOR_MASK;
        }
        out[0] = control;
        out[1] = self.sensor.wire_id();
        out[2] = ((self.subtype << SENSOR_SUBTYPE_SHIFT) & SENSOR_SUBTYPE_MASK)
            | (self.sequence & CONTROL_SEQUENCE_MASK);
        out[3] = self.param;
    }

    pub fn decode(packet: &[u8]) -> Option<Self> {
        if packet.len() < CTRL_PKT_HEADER_SIZE {
            return None;
        }
        let (control, sensor, attribute) = (packet[0], packet[1], packet[2]);
        Some(Self {
            packet_id: PacketId::from_bits((control & PKID_MASK) >> PKID_SHIFT)?,
            crc: control & PKT_CRC_MASK != 0,
            data_format: (control & CTRL_PKT_DF_MASK) >> 1,
            sensor: sensor_from_wire(control, sensor),
            subtype: (attribute & SENSOR_SUBTYPE_MASK) >> SENSOR_SUBTYPE_SHIFT,
            sequence: attribute & CONTROL_SEQUENCE_MASK,
            param: packet[3],
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PacketId {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            PacketId::SensorData => defmt::write!(fmt, "SensorData"),
            PacketId::ControlReqRead => defmt::write!(fmt, "ControlReqRead"),
            PacketId::ControlReqWrite => defmt::write!(fmt, "ControlReqWrite"),
            PacketId::ControlResp => defmt::write!(fmt, "ControlResp"),
            PacketId::TestData => defmt::write!(fmt, "TestData"),
        }
    }
}
