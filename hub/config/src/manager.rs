//! Control request handling

use core::fmt;

use sensorhub_batch::{BatchManager, BatchStateType};
use sensorhub_core::{HubError, HubResult, SensorType};
use sensorhub_packets::{
    format_control_packet, format_flush_complete, is_write_config_command, packet_id,
    parse_packet, ControlPacket, ControlPayload, LocalPacket, PacketId, ParamId,
    MAX_HIF_PACKET_SIZE, PKT_BASE_HEADER_SIZE,
};

use crate::descriptor::{
    descriptor_slot, DescriptorField, DescriptorSlot, DescriptorTable, SensorDescriptor,
};

/// Status code returned to the host in error-code responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmStatus {
    CmdSuccess,
    /// Command not allowed in the current batch state
    CmdFail,
    /// Command failed or is not implemented
    CmdNotSupported,
    PacketCorrupted,
    PacketChecksumFailed,
    /// Not a control request
    PacketUnsupported,
}

impl CmStatus {
    pub const fn code(self) -> i32 {
        match self {
            CmStatus::CmdSuccess => 0,
            CmStatus::CmdFail => -1,
            CmStatus::CmdNotSupported => -2,
            CmStatus::PacketCorrupted => -3,
            CmStatus::PacketChecksumFailed => -4,
            CmStatus::PacketUnsupported => -5,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CmStatus::CmdSuccess),
            -1 => Some(CmStatus::CmdFail),
            -2 => Some(CmStatus::CmdNotSupported),
            -3 => Some(CmStatus::PacketCorrupted),
            -4 => Some(CmStatus::PacketChecksumFailed),
            -5 => Some(CmStatus::PacketUnsupported),
            _ => None,
        }
    }
}

impl fmt::Display for CmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmStatus::CmdSuccess => write!(f, "Command succeeded"),
            CmStatus::CmdFail => write!(f, "Command not allowed"),
            CmStatus::CmdNotSupported => write!(f, "Command not supported"),
            CmStatus::PacketCorrupted => write!(f, "Packet corrupted"),
            CmStatus::PacketChecksumFailed => write!(f, "Packet checksum failed"),
            CmStatus::PacketUnsupported => write!(f, "Packet unsupported"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CmStatus {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "CmStatus({=i32})", self.code())
    }
}

/// Link to the algorithms that produce a sensor's results
pub trait SensorSubscriber {
    fn subscribe(&mut self, sensor: SensorType) -> HubResult<()>;
    fn unsubscribe(&mut self, sensor: SensorType) -> HubResult<()>;
}

/// Subscriber for hubs whose sensors stream without an algorithm stage
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubscriber;

impl SensorSubscriber for NoSubscriber {
    fn subscribe(&mut self, _sensor: SensorType) -> HubResult<()> {
        Ok(())
    }

    fn unsubscribe(&mut self, _sensor: SensorType) -> HubResult<()> {
        Ok(())
    }
}

/// Parses host control requests, checks them against the batch state,
/// applies them and queues the response.
pub struct ConfigManager<S = NoSubscriber> {
    descriptors: DescriptorTable,
    subscriber: S,
    last_status: CmStatus,
}

impl ConfigManager<NoSubscriber> {
    pub fn new(descriptors: DescriptorTable) -> Self {
        Self::with_subscriber(descriptors, NoSubscriber)
    }
}

impl<S: SensorSubscriber> ConfigManager<S> {
    pub fn with_subscriber(descriptors: DescriptorTable, subscriber: S) -> Self {
        Self {
            descriptors,
            subscriber,
            last_status: CmStatus::CmdSuccess,
        }
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    pub fn descriptors_mut(&mut self) -> &mut DescriptorTable {
        &mut self.descriptors
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    /// Status reported for the most recent request
    pub fn last_status(&self) -> CmStatus {
        self.last_status
    }

    /// Handle one control request at the start of `request`
    ///
    /// Requests with a non-zero sequence number are answered through the
    /// control response queue. Requests that cannot be parsed, or are not
    /// allowed in the current state, are answered with an error packet whose
    /// sensor and sequence are zero. The error of the failing step is
    /// returned.
    pub fn process_control_request(
        &mut self,
        batch: &mut BatchManager<'_>,
        request: &[u8],
    ) -> HubResult<()> {
        let is_write = match packet_id(request) {
            Some(PacketId::ControlReqWrite) => true,
            Some(PacketId::ControlReqRead) => false,
            _ => {
                self.reject(batch, CmStatus::PacketUnsupported);
                return Err(HubError::InvalidPacketId);
            }
        };

        let mut packet = match parse_packet(request) {
            Ok(parsed) => match parsed.packet {
                LocalPacket::Control(packet) => packet,
                _ => {
                    self.reject(batch, CmStatus::PacketCorrupted);
                    return Err(HubError::InvalidPacketId);
                }
            },
            Err(err) => {
                let status = if err.error == HubError::InvalidCrc {
                    CmStatus::PacketChecksumFailed
                } else {
                    CmStatus::PacketCorrupted
                };
                self.reject(batch, status);
                return Err(err.error);
            }
        };
        log::debug!(
            "control {} param {:#04x} for {} seq {}",
            if is_write { "write" } else { "read" },
            packet.param.0,
            packet.sensor,
            packet.sequence
        );

        let state = batch.state();
        if let Err(err) = state.command_validate(packet.param) {
            log::debug!("param {:#04x} not allowed in {:?}", packet.param.0, state.get());
            self.reject(batch, CmStatus::CmdFail);
            return Err(err);
        }
        if is_write_config_command(packet.packet_id, packet.param)
            && state.get()? == BatchStateType::Standby
        {
            state.set(BatchStateType::Config)?;
        }

        let result = if is_write {
            self.take_write_action(batch, &packet)
        } else {
            self.take_read_action(batch, &mut packet)
        };
        let status = match result {
            Ok(()) => CmStatus::CmdSuccess,
            Err(err) => {
                log::debug!("param {:#04x} failed: {}", packet.param.0, err);
                CmStatus::CmdNotSupported
            }
        };
        self.last_status = status;

        if packet.sequence == 0 {
            return result;
        }

        let crc = batch.config().response_crc;
        let mut out = [0u8; MAX_HIF_PACKET_SIZE];
        let len = if is_write || result.is_err() {
            let mut response =
                ControlPacket::error_response(packet.sensor, packet.sequence, status.code());
            response.subtype = packet.subtype;
            format_control_packet(&mut out, &response, crc)?
        } else {
            packet.packet_id = PacketId::ControlResp;
            format_control_packet(&mut out, &packet, crc)?
        };
        let queued = batch.control_response_enqueue(&out[..len]);
        if let Err(err) = queued {
            log::warn!("control response dropped: {}", err);
        }
        result.and(queued)
    }

    /// Queue an error response that carries no sensor or sequence
    fn reject(&mut self, batch: &mut BatchManager<'_>, status: CmStatus) {
        self.last_status = status;
        let response = ControlPacket::error_response(SensorType::META_DATA, 0, status.code());
        let mut out = [0u8; MAX_HIF_PACKET_SIZE];
        let queued = format_control_packet(&mut out, &response, batch.config().response_crc)
            .and_then(|len| batch.control_response_enqueue(&out[..len]));
        if let Err(err) = queued {
            log::warn!("error response {} dropped: {}", status.code(), err);
        }
    }

    fn take_write_action(&mut self, batch: &mut BatchManager<'_>, packet: &ControlPacket) -> HubResult<()> {
        let sensor = packet.sensor;
        match packet.param {
            ParamId::ENABLE => {
                let enable = match &packet.payload {
                    ControlPayload::Bytes(v) => v.first().copied().ok_or(HubError::InvalidParameter)?,
                    _ => return Err(HubError::InvalidParameter),
                };
                if enable != 0 {
                    batch.enable(sensor)?;
                    self.subscriber.subscribe(sensor)
                } else {
                    batch.deregister(sensor)?;
                    batch.disable(sensor)?;
                    self.subscriber.unsubscribe(sensor)
                }
            }
            ParamId::BATCH => match &packet.payload {
                ControlPayload::Doublewords(v) if v.len() == 2 => batch.register(sensor, v[0], v[1]),
                _ => Err(HubError::InvalidParameter),
            },
            ParamId::FLUSH => Self::flush(batch, sensor),
            ParamId::FIFO_EVT_CNT | ParamId::VERSION => Err(HubError::InvalidParameter),
            ParamId::CONFIG_DONE => batch.state().set(BatchStateType::Idle),
            param => {
                let (descriptor, field) = self.descriptor_field(sensor, param)?;
                descriptor.write_field(field, &packet.payload)
            }
        }
    }

    fn take_read_action(&mut self, batch: &BatchManager<'_>, packet: &mut ControlPacket) -> HubResult<()> {
        match packet.param {
            ParamId::ENABLE | ParamId::BATCH | ParamId::FLUSH | ParamId::CONFIG_DONE => {
                Err(HubError::InvalidParameter)
            }
            ParamId::FIFO_EVT_CNT => Err(HubError::UnsupportedFeature),
            ParamId::VERSION => {
                packet.payload = ControlPayload::text(batch.config().version);
                Ok(())
            }
            param => {
                let (descriptor, field) = self.descriptor_field(packet.sensor, param)?;
                packet.payload = descriptor.read_field(field)?;
                Ok(())
            }
        }
    }

    /// Descriptor of `sensor` and the field `param` addresses
    fn descriptor_field(
        &mut self,
        sensor: SensorType,
        param: ParamId,
    ) -> HubResult<(&mut SensorDescriptor, DescriptorField)> {
        let field = match descriptor_slot(param) {
            DescriptorSlot::Field(field) => field,
            DescriptorSlot::Undefined | DescriptorSlot::FurtherAction => {
                return Err(HubError::UnsupportedFeature)
            }
            // time synchronisation is not handled by the hub yet
            DescriptorSlot::NoDescriptor if param.0 >= ParamId::SH_TIME_SET.0 => {
                return Err(HubError::UnsupportedFeature)
            }
            DescriptorSlot::NoDescriptor | DescriptorSlot::Illegal => {
                return Err(HubError::InvalidParameter)
            }
        };
        let descriptor = self
            .descriptors
            .get_mut(sensor)
            .ok_or(HubError::UnsupportedFeature)?;
        Ok((descriptor, field))
    }

    /// Queue a flush-complete marker behind the sensor's samples and wake the host
    fn flush(batch: &mut BatchManager<'_>, sensor: SensorType) -> HubResult<()> {
        if !batch.is_sensor_enabled(sensor)? {
            return Err(HubError::SensorNotRegistered);
        }
        let mut marker = [0u8; PKT_BASE_HEADER_SIZE];
        let len = format_flush_complete(&mut marker, sensor, false)?;
        let queued = batch.sensor_data_enqueue(&marker[..len], sensor);
        batch.queue_flush(batch.sensor_queue_class(sensor)?);
        queued
    }
}
