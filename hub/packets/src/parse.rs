//! Wire bytes to local packets

use core::fmt;

use heapless::Vec;
use sensorhub_core::HubError;

use crate::crc::crc_matches;
use crate::header::{
    packet_id, packet_version, ControlHeader, Format, PacketId, SensorHeader, TimestampSize,
    CRC_SIZE, CTRL_PKT_HEADER_SIZE, DataSize, META_DATA_OFFSET_CHANGE, PKT_BASE_HEADER_SIZE,
    PKT_TIMESTAMP_OFFSET,
};
use crate::local::{
    ControlPacket, ControlPayload, LocalPacket, ParsedPacket, SensorPacket, SensorPayload,
};
use crate::tables::{control_payload_size, sensor_packet_type, ParamId, SensorPacketType};

/// Parse failure with the nominal packet size when it could be determined
///
/// `size` is non-zero for CRC mismatches and truncated packets so a stream
/// reader can skip or wait for the rest of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub error: HubError,
    pub size: usize,
}

impl ParseError {
    const fn new(error: HubError, size: usize) -> Self {
        Self { error, size }
    }

    const fn bare(error: HubError) -> Self {
        Self { error, size: 0 }
    }
}

impl From<ParseError> for HubError {
    fn from(err: ParseError) -> Self {
        err.error
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size > 0 {
            write!(f, "{} ({} byte packet)", self.error, self.size)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

#[cfg(feature = "defmt")]
impl defmt::Format for ParseError {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} size={}", self.error, self.size)
    }
}

/// Sequential reader; the caller checks the length first
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8], pos: usize, big_endian: bool) -> Self {
        Self {
            buf,
            pos,
            big_endian,
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        if !self.big_endian {
            bytes.reverse();
        }
        bytes
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i16(&mut self) -> i16 {
        i16::from_be_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_be_bytes(self.take())
    }

    fn i32x3(&mut self) -> [i32; 3] {
        [self.i32(), self.i32(), self.i32()]
    }
}

/// Parse the packet at the start of `buf`
///
/// On success the packet and the number of bytes it used are returned.
/// Checks run in order: version and packet id, header fields against the
/// sensor's layout, nominal size against the buffer, then the CRC.
pub fn parse_packet(buf: &[u8]) -> Result<ParsedPacket, ParseError> {
    if buf.is_empty() {
        return Err(ParseError::bare(HubError::BufferTooSmall));
    }
    if packet_version(buf) != 0 {
        return Err(ParseError::bare(HubError::UnsupportedFeature));
    }
    let id = packet_id(buf).ok_or(ParseError::bare(HubError::InvalidPacketId))?;
    if id.is_sensor() {
        parse_sample(buf, id)
    } else {
        parse_control(buf)
    }
}

fn check_size(buf: &[u8], size: usize, crc: bool) -> Result<(), ParseError> {
    if size > buf.len() {
        return Err(ParseError::new(HubError::BufferTooSmall, size));
    }
    if crc && !crc_matches(buf, size) {
        return Err(ParseError::new(HubError::InvalidCrc, size));
    }
    Ok(())
}

const fn crc_len(crc: bool) -> usize {
    if crc {
        CRC_SIZE
    } else {
        0
    }
}

fn header_matches(header: &SensorHeader, packet_type: SensorPacketType) -> bool {
    let desc = packet_type.desc();
    match packet_type {
        SensorPacketType::Raw => {
            header.subtype == 0
                && header.data_size == DataSize::Bits16
                && header.data_format == Format::Raw
                && header.time_format == Format::Raw
        }
        _ => {
            header.data_size == desc.data_size
                && header.data_format == desc.data_format
                && header.time_format == Format::FixedPoint
                && header.timestamp_size == desc.timestamp_size
        }
    }
}

fn parse_sample(buf: &[u8], id: PacketId) -> Result<ParsedPacket, ParseError> {
    let header =
        SensorHeader::decode(buf).ok_or(ParseError::bare(HubError::BufferTooSmall))?;

    if header.flush {
        let size = PKT_BASE_HEADER_SIZE + crc_len(header.crc);
        check_size(buf, size, header.crc)?;
        return Ok(ParsedPacket {
            size,
            packet: LocalPacket::FlushComplete(header.sensor),
        });
    }

    let packet_type = sensor_packet_type(header.sensor)
        .map_err(|_| ParseError::bare(HubError::UnsupportedFeature))?;
    if !header_matches(&header, packet_type) {
        return Err(ParseError::bare(HubError::SensorUnsupported));
    }

    let desc = packet_type.desc();
    let with_offset = packet_type == SensorPacketType::Uncalibrated
        && header.metadata == META_DATA_OFFSET_CHANGE;
    let body = desc.size_sans_crc as usize
        + if with_offset {
            packet_type.offset_block_size()
        } else {
            0
        };
    let size = body + crc_len(header.crc);
    check_size(buf, size, header.crc)?;

    let mut r = WireReader::new(buf, PKT_TIMESTAMP_OFFSET, true);
    let timestamp = match desc.timestamp_size {
        TimestampSize::Bits32 => r.u32() as u64,
        TimestampSize::Bits64 => r.u64(),
    };

    r.big_endian = desc.big_endian;
    let payload = match packet_type {
        SensorPacketType::Raw => SensorPayload::Raw {
            axis: [r.i16(), r.i16(), r.i16()],
        },
        SensorPacketType::Uncalibrated => {
            let axis = r.i32x3();
            let offset = if with_offset { Some(r.i32x3()) } else { None };
            SensorPayload::Uncalibrated { axis, offset }
        }
        SensorPacketType::Calibrated => SensorPayload::Calibrated { axis: r.i32x3() },
        SensorPacketType::Quaternion => SensorPayload::Quaternion {
            quat: [r.i32(), r.i32(), r.i32(), r.i32()],
        },
        SensorPacketType::Orientation => {
            let [pitch, roll, yaw] = r.i32x3();
            SensorPayload::Orientation { pitch, roll, yaw }
        }
        SensorPacketType::ThreeAxis => SensorPayload::ThreeAxis { axis: r.i32x3() },
        SensorPacketType::SignificantMotion => SensorPayload::SignificantMotion { detected: r.u8() },
        SensorPacketType::StepCounter => SensorPayload::StepCounter { total: r.u64() },
        SensorPacketType::StepDetector => SensorPayload::StepDetector { detected: r.u8() },
    };
    debug_assert_eq!(r.pos, body);

    let sample = SensorPacket {
        sensor: header.sensor,
        subtype: header.subtype,
        metadata: header.metadata,
        timestamp,
        payload,
    };
    let packet = if id == PacketId::TestData {
        LocalPacket::TestData(sample)
    } else {
        LocalPacket::Sensor(sample)
    };
    Ok(ParsedPacket { size, packet })
}

fn parse_control(buf: &[u8]) -> Result<ParsedPacket, ParseError> {
    let header =
        ControlHeader::decode(buf).ok_or(ParseError::bare(HubError::BufferTooSmall))?;
    let param = ParamId(header.param);
    let payload_size = control_payload_size(header.packet_id, param).map_err(ParseError::bare)?;
    let desc = param.desc().map_err(ParseError::bare)?;

    let size = CTRL_PKT_HEADER_SIZE + payload_size + crc_len(header.crc);
    check_size(buf, size, header.crc)?;

    let mut r = WireReader::new(buf, CTRL_PKT_HEADER_SIZE, desc.big_endian);
    let count = desc.num_elements as usize;
    let payload = if payload_size == 0 {
        ControlPayload::Empty
    } else {
        match desc.element_size {
            1 => ControlPayload::Bytes((0..count).map(|_| r.u8()).collect::<Vec<_, 32>>()),
            2 => ControlPayload::Halfwords((0..count).map(|_| r.i16()).collect::<Vec<_, 12>>()),
            4 => ControlPayload::Words((0..count).map(|_| r.i32()).collect::<Vec<_, 9>>()),
            8 => ControlPayload::Doublewords((0..count).map(|_| r.u64()).collect::<Vec<_, 2>>()),
            _ => return Err(ParseError::bare(HubError::InvalidParameter)),
        }
    };

    Ok(ParsedPacket {
        size,
        packet: LocalPacket::Control(ControlPacket {
            packet_id: header.packet_id,
            sensor: header.sensor,
            subtype: header.subtype,
            sequence: header.sequence,
            param,
            data_format: header.data_format,
            payload,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_version() {
        assert_eq!(parse_packet(&[]).unwrap_err().error, HubError::BufferTooSmall);
        assert_eq!(
            parse_packet(&[0x80, 0, 0]).unwrap_err().error,
            HubError::UnsupportedFeature
        );
        assert_eq!(
            parse_packet(&[0x70, 0, 0, 0]).unwrap_err().error,
            HubError::InvalidPacketId
        );
    }

    #[test]
    fn test_truncated_keeps_size() {
        // accelerometer, fixed point, 32-bit data, 64-bit timestamp
        let err = parse_packet(&[0x06, 1, 0x05, 0, 0]).unwrap_err();
        assert_eq!(err, ParseError::new(HubError::BufferTooSmall, 23));
    }

    #[test]
    fn test_unimplemented_sensor() {
        let err = parse_packet(&[0x06, 5, 0x05]).unwrap_err();
        assert_eq!(err.error, HubError::UnsupportedFeature);
        let err = parse_packet(&[0x06, 50, 0x05]).unwrap_err();
        assert_eq!(err.error, HubError::UnsupportedFeature);
    }

    #[test]
    fn test_field_mismatch() {
        // accelerometer with raw data format
        let err = parse_packet(&[0x02, 1, 0x05]).unwrap_err();
        assert_eq!(err, ParseError::bare(HubError::SensorUnsupported));
        // raw sensor with a subtype
        let err = parse_packet(&[0x00, 22, 0x12]).unwrap_err();
        assert_eq!(err.error, HubError::SensorUnsupported);
    }

    #[test]
    fn test_control_direction() {
        // read request for the write-only enable parameter
        let err = parse_packet(&[0x10, 1, 0x01, 0x01]).unwrap_err();
        assert_eq!(err.error, HubError::InvalidParameter);
        let err = parse_packet(&[0x10, 1, 0x01, 0x40]).unwrap_err();
        assert_eq!(err.error, HubError::InvalidParameter);
        assert_eq!(
            parse_packet(&[0x10, 1, 0x01]).unwrap_err().error,
            HubError::BufferTooSmall
        );
    }
}
