//! Local packets to wire bytes

use sensorhub_core::{HubError, HubResult, SensorType};

use crate::crc::append_crc;
use crate::header::{
    ControlHeader, DataSize, Format, PacketId, SensorHeader, TimestampSize,
    CRC_SIZE, CTRL_PKT_HEADER_SIZE, META_DATA_OFFSET_CHANGE, PKT_BASE_HEADER_SIZE,
    SENSOR_DATA_PKT_HEADER_SIZE,
};
use crate::local::{ControlPacket, ControlPayload, SensorPacket, SensorPayload};
use crate::tables::{control_payload_size, sensor_packet_type};

/// Sequential writer over an output slice; the caller checks the length first
pub(crate) struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> WireWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8], pos: usize, big_endian: bool) -> Self {
        Self {
            buf,
            pos,
            big_endian,
        }
    }

    fn put(&mut self, be: &[u8], le: &[u8]) {
        let bytes = if self.big_endian { be } else { le };
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.put(&[v], &[v]);
    }

    pub(crate) fn i16(&mut self, v: i16) {
        self.put(&v.to_be_bytes(), &v.to_le_bytes());
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.put(&v.to_be_bytes(), &v.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.put(&v.to_be_bytes(), &v.to_le_bytes());
    }

    pub(crate) fn u64(&mut self, v: u64) {
        self.put(&v.to_be_bytes(), &v.to_le_bytes());
    }

    pub(crate) fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}

/// Format a sensor data packet, returning its length
pub fn format_sensor_packet(out: &mut [u8], packet: &SensorPacket, crc: bool) -> HubResult<usize> {
    format_sample(out, PacketId::SensorData, packet, crc)
}

/// Format a test data packet; same layout as sensor data
pub fn format_test_packet(out: &mut [u8], packet: &SensorPacket, crc: bool) -> HubResult<usize> {
    format_sample(out, PacketId::TestData, packet, crc)
}

fn format_sample(
    out: &mut [u8],
    packet_id: PacketId,
    packet: &SensorPacket,
    crc: bool,
) -> HubResult<usize> {
    let packet_type = sensor_packet_type(packet.sensor)?;
    if packet.payload.packet_type() != packet_type {
        return Err(HubError::SensorUnsupported);
    }
    let desc = packet_type.desc();

    let offset = match packet.payload {
        SensorPayload::Uncalibrated { offset, .. } => {
            match (offset, packet.metadata == META_DATA_OFFSET_CHANGE) {
                (Some(o), true) => Some(o),
                (None, false) => None,
                _ => return Err(HubError::InvalidParameter),
            }
        }
        _ => None,
    };

    let len = desc.size_sans_crc as usize + offset.map_or(0, |_| packet_type.offset_block_size());
    if out.len() < len + if crc { CRC_SIZE } else { 0 } {
        return Err(HubError::BufferTooSmall);
    }

    let header = SensorHeader {
        packet_id,
        crc: false,
        data_format: desc.data_format,
        time_format: desc.time_format,
        metadata: packet.metadata,
        sensor: packet.sensor,
        subtype: packet.subtype,
        flush: false,
        data_size: desc.data_size,
        timestamp_size: desc.timestamp_size,
    };
    header.encode(out);

    let mut w = WireWriter::new(out, SENSOR_DATA_PKT_HEADER_SIZE, true);
    match desc.timestamp_size {
        TimestampSize::Bits32 => w.u32(packet.timestamp as u32),
        TimestampSize::Bits64 => w.u64(packet.timestamp),
    }

    w.set_big_endian(desc.big_endian);
    match packet.payload {
        SensorPayload::Raw { axis } => axis.iter().for_each(|&v| w.i16(v)),
        SensorPayload::Uncalibrated { axis, .. }
        | SensorPayload::Calibrated { axis }
        | SensorPayload::ThreeAxis { axis } => axis.iter().for_each(|&v| w.i32(v)),
        SensorPayload::Quaternion { quat } => quat.iter().for_each(|&v| w.i32(v)),
        SensorPayload::Orientation { pitch, roll, yaw } => {
            w.i32(pitch);
            w.i32(roll);
            w.i32(yaw);
        }
        SensorPayload::SignificantMotion { detected }
        | SensorPayload::StepDetector { detected } => w.u8(detected),
        SensorPayload::StepCounter { total } => w.u64(total),
    }
    if let Some(offset) = offset {
        offset.iter().for_each(|&v| w.i32(v));
    }
    debug_assert_eq!(w.position(), len);

    finish(out, len, crc)
}

/// Flush-complete marker: a bare sensor header with the flush bit set
pub fn format_flush_complete(out: &mut [u8], sensor: SensorType, crc: bool) -> HubResult<usize> {
    if !sensor.is_valid() {
        return Err(HubError::SensorInvalidType);
    }
    if out.len() < PKT_BASE_HEADER_SIZE + if crc { CRC_SIZE } else { 0 } {
        return Err(HubError::BufferTooSmall);
    }
    let header = SensorHeader {
        packet_id: PacketId::SensorData,
        crc: false,
        data_format: Format::Raw,
        time_format: Format::Raw,
        metadata: 0,
        sensor,
        subtype: 0,
        flush: true,
        data_size: DataSize::Bits8,
        timestamp_size: TimestampSize::Bits32,
    };
    header.encode(out);
    finish(out, PKT_BASE_HEADER_SIZE, crc)
}

/// Format a control request or response, returning its length
///
/// The payload must match the parameter's element width and count for the
/// packet direction; requests that carry no data need an empty payload.
pub fn format_control_packet(out: &mut [u8], packet: &ControlPacket, crc: bool) -> HubResult<usize> {
    let payload_size = control_payload_size(packet.packet_id, packet.param)?;
    let desc = packet.param.desc()?;
    if payload_size == 0 {
        if !packet.payload.is_empty() {
            return Err(HubError::InvalidParameter);
        }
    } else if packet.payload.element_size() != desc.element_size as usize
        || packet.payload.len() != desc.num_elements as usize
    {
        return Err(HubError::InvalidParameter);
    }

    let len = CTRL_PKT_HEADER_SIZE + payload_size;
    if out.len() < len + if crc { CRC_SIZE } else { 0 } {
        return Err(HubError::BufferTooSmall);
    }

    let header = ControlHeader {
        packet_id: packet.packet_id,
        crc: false,
        data_format: packet.data_format,
        sensor: packet.sensor,
        subtype: packet.subtype,
        sequence: packet.sequence,
        param: packet.param.0,
    };
    header.encode(out);

    let mut w = WireWriter::new(out, CTRL_PKT_HEADER_SIZE, desc.big_endian);
    if payload_size > 0 {
        match &packet.payload {
            ControlPayload::Empty => {}
            ControlPayload::Bytes(v) => v.iter().for_each(|&b| w.u8(b)),
            ControlPayload::Halfwords(v) => v.iter().for_each(|&h| w.i16(h)),
            ControlPayload::Words(v) => v.iter().for_each(|&x| w.i32(x)),
            ControlPayload::Doublewords(v) => v.iter().for_each(|&d| w.u64(d)),
        }
    }
    debug_assert_eq!(w.position(), len);

    finish(out, len, crc)
}

/// Error-code response for a request from `sensor` with `sequence`
pub fn format_error_response(
    out: &mut [u8],
    sensor: SensorType,
    sequence: u8,
    code: i32,
    crc: bool,
) -> HubResult<usize> {
    format_control_packet(out, &ControlPacket::error_response(sensor, sequence, code), crc)
}

fn finish(out: &mut [u8], len: usize, crc: bool) -> HubResult<usize> {
    if crc {
        append_crc(out, len)
    } else {
        Ok(len)
    }
}
