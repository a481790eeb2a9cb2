//! Decoded packets in host byte order

use heapless::Vec;
use sensorhub_core::{HubError, HubResult, SensorType};

use crate::header::{PacketId, META_DATA_OFFSET_CHANGE};
use crate::tables::{ParamId, SensorPacketType};

/// Data carried by a sensor packet, one variant per packet layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPayload {
    Raw { axis: [i16; 3] },
    /// `offset` is present exactly when the packet metadata announces it
    Uncalibrated {
        axis: [i32; 3],
        offset: Option<[i32; 3]>,
    },
    Calibrated { axis: [i32; 3] },
    Quaternion { quat: [i32; 4] },
    Orientation { pitch: i32, roll: i32, yaw: i32 },
    ThreeAxis { axis: [i32; 3] },
    SignificantMotion { detected: u8 },
    StepCounter { total: u64 },
    StepDetector { detected: u8 },
}

impl SensorPayload {
    pub const fn packet_type(&self) -> SensorPacketType {
        match self {
            SensorPayload::Raw { .. } => SensorPacketType::Raw,
            SensorPayload::Uncalibrated { .. } => SensorPacketType::Uncalibrated,
            SensorPayload::Calibrated { .. } => SensorPacketType::Calibrated,
            SensorPayload::Quaternion { .. } => SensorPacketType::Quaternion,
            SensorPayload::Orientation { .. } => SensorPacketType::Orientation,
            SensorPayload::ThreeAxis { .. } => SensorPacketType::ThreeAxis,
            SensorPayload::SignificantMotion { .. } => SensorPacketType::SignificantMotion,
            SensorPayload::StepCounter { .. } => SensorPacketType::StepCounter,
            SensorPayload::StepDetector { .. } => SensorPacketType::StepDetector,
        }
    }
}

/// Sensor sample with its header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPacket {
    pub sensor: SensorType,
    pub subtype: u8,
    pub metadata: u8,
    /// Nanoseconds, or the raw 32-bit counter for raw packets
    pub timestamp: u64,
    pub payload: SensorPayload,
}

impl SensorPacket {
    pub const fn new(sensor: SensorType, timestamp: u64, payload: SensorPayload) -> Self {
        let metadata = match payload {
            SensorPayload::Uncalibrated {
                offset: Some(_), ..
            } => META_DATA_OFFSET_CHANGE,
            _ => 0,
        };
        Self {
            sensor,
            subtype: 0,
            metadata,
            timestamp,
            payload,
        }
    }
}

/// Payload of a control packet, grouped by element width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPayload {
    Empty,
    Bytes(Vec<u8, 32>),
    Halfwords(Vec<i16, 12>),
    Words(Vec<i32, 9>),
    Doublewords(Vec<u64, 2>),
}

impl ControlPayload {
    pub fn element_size(&self) -> usize {
        match self {
            ControlPayload::Empty => 0,
            ControlPayload::Bytes(_) => 1,
            ControlPayload::Halfwords(_) => 2,
            ControlPayload::Words(_) => 4,
            ControlPayload::Doublewords(_) => 8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ControlPayload::Empty => 0,
            ControlPayload::Bytes(v) => v.len(),
            ControlPayload::Halfwords(v) => v.len(),
            ControlPayload::Words(v) => v.len(),
            ControlPayload::Doublewords(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload size on the wire
    pub fn byte_len(&self) -> usize {
        self.element_size() * self.len()
    }

    pub fn bytes(values: &[u8]) -> HubResult<Self> {
        Vec::from_slice(values)
            .map(ControlPayload::Bytes)
            .map_err(|_| HubError::InvalidParameter)
    }

    pub fn halfwords(values: &[i16]) -> HubResult<Self> {
        Vec::from_slice(values)
            .map(ControlPayload::Halfwords)
            .map_err(|_| HubError::InvalidParameter)
    }

    pub fn words(values: &[i32]) -> HubResult<Self> {
        Vec::from_slice(values)
            .map(ControlPayload::Words)
            .map_err(|_| HubError::InvalidParameter)
    }

    pub fn doublewords(values: &[u64]) -> HubResult<Self> {
        Vec::from_slice(values)
            .map(ControlPayload::Doublewords)
            .map_err(|_| HubError::InvalidParameter)
    }

    /// Fixed 32-byte text field, NUL padded and truncated
    pub fn text(s: &str) -> Self {
        let mut field = [0u8; 32];
        let n = s.len().min(field.len());
        field[..n].copy_from_slice(&s.as_bytes()[..n]);
        ControlPayload::Bytes(filled(field))
    }

    /// Text up to the first NUL of a byte payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ControlPayload::Bytes(v) => {
                let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
                core::str::from_utf8(&v[..end]).ok()
            }
            _ => None,
        }
    }
}

/// Control request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub packet_id: PacketId,
    pub sensor: SensorType,
    pub subtype: u8,
    /// 4-bit sequence number; zero means no response wanted
    pub sequence: u8,
    pub param: ParamId,
    pub data_format: u8,
    pub payload: ControlPayload,
}

impl ControlPacket {
    fn new(
        packet_id: PacketId,
        sensor: SensorType,
        sequence: u8,
        param: ParamId,
        payload: ControlPayload,
    ) -> Self {
        Self {
            packet_id,
            sensor,
            subtype: 0,
            sequence,
            param,
            data_format: 0,
            payload,
        }
    }

    /// Enable (`true`) or disable a sensor; the flag goes out as 0 or 1
    pub fn enable(sensor: SensorType, sequence: u8, enable: bool) -> Self {
        Self::new(
            PacketId::ControlReqWrite,
            sensor,
            sequence,
            ParamId::ENABLE,
            ControlPayload::Bytes(filled([enable as u8])),
        )
    }

    /// Batch request: sample period and report latency in nanoseconds
    pub fn batch(sensor: SensorType, sequence: u8, period_ns: u64, latency_ns: u64) -> Self {
        Self::new(
            PacketId::ControlReqWrite,
            sensor,
            sequence,
            ParamId::BATCH,
            ControlPayload::Doublewords(filled([period_ns, latency_ns])),
        )
    }

    pub fn flush(sensor: SensorType, sequence: u8) -> Self {
        Self::new(
            PacketId::ControlReqWrite,
            sensor,
            sequence,
            ParamId::FLUSH,
            ControlPayload::Empty,
        )
    }

    pub fn config_done(sensor: SensorType, sequence: u8) -> Self {
        Self::new(
            PacketId::ControlReqWrite,
            sensor,
            sequence,
            ParamId::CONFIG_DONE,
            ControlPayload::Empty,
        )
    }

    pub fn read(sensor: SensorType, sequence: u8, param: ParamId) -> Self {
        Self::new(
            PacketId::ControlReqRead,
            sensor,
            sequence,
            param,
            ControlPayload::Empty,
        )
    }

    pub fn write(sensor: SensorType, sequence: u8, param: ParamId, payload: ControlPayload) -> Self {
        Self::new(PacketId::ControlReqWrite, sensor, sequence, param, payload)
    }

    pub fn response(sensor: SensorType, sequence: u8, param: ParamId, payload: ControlPayload) -> Self {
        Self::new(PacketId::ControlResp, sensor, sequence, param, payload)
    }

    /// Response carrying a status code in an error-code parameter
    pub fn error_response(sensor: SensorType, sequence: u8, code: i32) -> Self {
        Self::new(
            PacketId::ControlResp,
            sensor,
            sequence,
            ParamId::ERROR_CODE_IN_DATA,
            ControlPayload::Words(filled([code])),
        )
    }

    /// Status code of an error-code response
    pub fn error_code(&self) -> Option<i32> {
        match (&self.payload, self.param) {
            (ControlPayload::Words(v), ParamId::ERROR_CODE_IN_DATA) => v.first().copied(),
            _ => None,
        }
    }
}

/// Any packet understood by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalPacket {
    Sensor(SensorPacket),
    TestData(SensorPacket),
    /// End of a flush request for this sensor
    FlushComplete(SensorType),
    Control(ControlPacket),
}

impl LocalPacket {
    pub fn sensor(&self) -> SensorType {
        match self {
            LocalPacket::Sensor(p) | LocalPacket::TestData(p) => p.sensor,
            LocalPacket::FlushComplete(sensor) => *sensor,
            LocalPacket::Control(p) => p.sensor,
        }
    }

    pub fn packet_id(&self) -> PacketId {
        match self {
            LocalPacket::Sensor(_) | LocalPacket::FlushComplete(_) => PacketId::SensorData,
            LocalPacket::TestData(_) => PacketId::TestData,
            LocalPacket::Control(p) => p.packet_id,
        }
    }
}

/// Successfully parsed packet and the number of bytes it occupied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub size: usize,
    pub packet: LocalPacket,
}

/// Compile-time proof that an `M`-element array fits a vector of capacity `N`
struct Fits<const M: usize, const N: usize>;

impl<const M: usize, const N: usize> Fits<M, N> {
    const OK: () = assert!(M <= N, "array larger than payload capacity");
}

/// Payload vector built from an array that always fits
fn filled<T, const M: usize, const N: usize>(values: [T; M]) -> Vec<T, N> {
    let () = Fits::<M, N>::OK;
    values.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_is_normalised() {
        let on = ControlPacket::enable(SensorType::ACCELEROMETER, 1, true);
        assert_eq!(on.payload, ControlPayload::bytes(&[1]).unwrap());
        let off = ControlPacket::enable(SensorType::ACCELEROMETER, 1, false);
        assert_eq!(off.payload, ControlPayload::bytes(&[0]).unwrap());
    }

    #[test]
    fn test_text_payload() {
        let payload = ControlPayload::text("hub-1.0");
        assert_eq!(payload.byte_len(), 32);
        assert_eq!(payload.as_text(), Some("hub-1.0"));
    }

    #[test]
    fn test_uncalibrated_metadata_follows_offset() {
        let packet = SensorPacket::new(
            SensorType::GYROSCOPE_UNCALIBRATED,
            5,
            SensorPayload::Uncalibrated {
                axis: [1, 2, 3],
                offset: Some([4, 5, 6]),
            },
        );
        assert_eq!(packet.metadata, META_DATA_OFFSET_CHANGE);
    }

    #[test]
    fn test_fixed_payloads_keep_every_value() {
        let batch = ControlPacket::batch(SensorType::ACCELEROMETER, 2, u64::MAX, 0);
        assert_eq!(batch.payload, ControlPayload::doublewords(&[u64::MAX, 0]).unwrap());

        let long = "a version string longer than thirty-two bytes";
        let text = ControlPayload::text(long);
        assert_eq!(text.len(), 32);
        assert_eq!(text.as_text(), Some(&long[..32]));
        let field: Vec<u8, 32> = filled([7u8; 32]);
        assert!(field.is_full());
    }

    #[test]
    fn test_error_code() {
        let packet = ControlPacket::error_response(SensorType::META_DATA, 3, -2);
        assert_eq!(packet.error_code(), Some(-2));
        assert_eq!(ControlPacket::flush(SensorType::GYROSCOPE, 1).error_code(), None);
    }
}
