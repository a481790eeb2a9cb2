//! Packet Formatter
//!
//! Renders decoded host-interface packets as coloured text or JSON lines

use chrono::Local;
use colored::{ColoredString, Colorize};
use sensorhub_packets::{
    ControlPacket, ControlPayload, LocalPacket, PacketId, ParamId, SensorPacket, SensorPayload,
};
use serde::Serialize;
use serde_json::{json, Value};

const TEXT_FIELD_LEN: usize = 32;

/// One packet in the shape printed by `--json`
#[derive(Debug, Serialize)]
struct PacketRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    received: Option<String>,
    kind: &'static str,
    sensor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<u8>,
    data: Value,
}

pub struct PacketFormatter {
    show_timestamps: bool,
    json_format: bool,
}

impl PacketFormatter {
    pub fn new(show_timestamps: bool, json_format: bool) -> Self {
        Self {
            show_timestamps,
            json_format,
        }
    }

    pub fn print_packet(&self, packet: &LocalPacket) {
        println!("{}", self.format_packet(packet));
    }

    pub fn format_packet(&self, packet: &LocalPacket) -> String {
        let record = self.record(packet);
        if self.json_format {
            Self::format_json(&record)
        } else {
            Self::format_text(packet, &record)
        }
    }

    fn record(&self, packet: &LocalPacket) -> PacketRecord {
        let received = self
            .show_timestamps
            .then(|| Local::now().format("%H:%M:%S%.3f").to_string());
        let mut record = PacketRecord {
            received,
            kind: kind_name(packet),
            sensor: packet.sensor().to_string(),
            timestamp: None,
            sequence: None,
            param: None,
            data: Value::Null,
        };
        match packet {
            LocalPacket::Sensor(sample) | LocalPacket::TestData(sample) => {
                record.timestamp = Some(sample.timestamp);
                record.data = sensor_data(sample);
            }
            LocalPacket::FlushComplete(_) => {}
            LocalPacket::Control(control) => {
                record.sequence = Some(control.sequence);
                record.param = Some(control.param.0);
                record.data = control_data(control);
            }
        }
        record
    }

    fn format_json(record: &PacketRecord) -> String {
        serde_json::to_string(record).unwrap_or_else(|err| json!({ "error": err.to_string() }).to_string())
    }

    fn format_text(packet: &LocalPacket, record: &PacketRecord) -> String {
        let timestamp_str = match &record.received {
            Some(received) => format!("[{}] ", received).dimmed().to_string(),
            None => String::new(),
        };
        let name = colored_kind(packet, record.kind);

        let mut details = String::new();
        if let Some(ts) = record.timestamp {
            details.push_str(&format!(" t={}", ts.to_string().bright_yellow()));
        }
        if let Some(seq) = record.sequence {
            details.push_str(&format!(" seq={} param={:#04x}", seq, record.param.unwrap_or(0)));
        }
        if !record.data.is_null() {
            details.push_str(&format!(" {}", record.data));
        }

        format!("{}{:14} {:28}{}", timestamp_str, name, record.sensor, details)
    }
}

fn kind_name(packet: &LocalPacket) -> &'static str {
    match packet {
        LocalPacket::Sensor(_) => "SENSOR",
        LocalPacket::TestData(_) => "TEST",
        LocalPacket::FlushComplete(_) => "FLUSH_DONE",
        LocalPacket::Control(control) => match control.packet_id {
            PacketId::ControlReqRead => "CTRL_READ",
            PacketId::ControlReqWrite => "CTRL_WRITE",
            _ if control.error_code().is_some() => "CTRL_ERROR",
            _ => "CTRL_RESP",
        },
    }
}

fn colored_kind(packet: &LocalPacket, name: &'static str) -> ColoredString {
    match packet {
        LocalPacket::Sensor(_) => name.bright_green(),
        LocalPacket::TestData(_) => name.cyan(),
        LocalPacket::FlushComplete(_) => name.bright_yellow(),
        LocalPacket::Control(control) => match control.error_code() {
            Some(code) if code != 0 => name.bright_red().bold(),
            _ if control.packet_id == PacketId::ControlResp => name.magenta(),
            _ => name.bright_blue(),
        },
    }
}

fn sensor_data(sample: &SensorPacket) -> Value {
    match sample.payload {
        SensorPayload::Raw { axis } => json!({ "axis": axis }),
        SensorPayload::Uncalibrated { axis, offset } => json!({ "axis": axis, "offset": offset }),
        SensorPayload::Calibrated { axis } | SensorPayload::ThreeAxis { axis } => json!({ "axis": axis }),
        SensorPayload::Quaternion { quat } => json!({ "quat": quat }),
        SensorPayload::Orientation { pitch, roll, yaw } => {
            json!({ "pitch": pitch, "roll": roll, "yaw": yaw })
        }
        SensorPayload::SignificantMotion { detected } | SensorPayload::StepDetector { detected } => {
            json!({ "detected": detected })
        }
        SensorPayload::StepCounter { total } => json!({ "total": total }),
    }
}

fn control_data(control: &ControlPacket) -> Value {
    if let Some(code) = control.error_code() {
        return json!({ "status": code });
    }
    match &control.payload {
        ControlPayload::Empty => Value::Null,
        ControlPayload::Bytes(v) if v.len() == TEXT_FIELD_LEN && control.param != ParamId::ENABLE => {
            match control.payload.as_text() {
                Some(text) => json!(text),
                None => json!(v.as_slice()),
            }
        }
        ControlPayload::Bytes(v) => json!(v.as_slice()),
        ControlPayload::Halfwords(v) => json!(v.as_slice()),
        ControlPayload::Words(v) => json!(v.as_slice()),
        ControlPayload::Doublewords(v) => json!(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_core::SensorType;

    #[test]
    fn test_json_sensor_packet() {
        let formatter = PacketFormatter::new(false, true);
        let packet = LocalPacket::Sensor(SensorPacket::new(
            SensorType::ACCELEROMETER,
            1_000,
            SensorPayload::Calibrated { axis: [1, -2, 3] },
        ));
        let line: Value = serde_json::from_str(&formatter.format_packet(&packet)).unwrap();
        assert_eq!(line["kind"], "SENSOR");
        assert_eq!(line["timestamp"], 1_000);
        assert_eq!(line["data"]["axis"], json!([1, -2, 3]));
        assert!(line.get("received").is_none());
    }

    #[test]
    fn test_json_error_response() {
        let formatter = PacketFormatter::new(false, true);
        let packet = LocalPacket::Control(ControlPacket::error_response(SensorType::ACCELEROMETER, 3, -2));
        let line: Value = serde_json::from_str(&formatter.format_packet(&packet)).unwrap();
        assert_eq!(line["kind"], "CTRL_ERROR");
        assert_eq!(line["sequence"], 3);
        assert_eq!(line["data"]["status"], -2);
    }

    #[test]
    fn test_text_shows_version_string() {
        colored::control::set_override(false);
        let formatter = PacketFormatter::new(false, false);
        let packet = LocalPacket::Control(ControlPacket::response(
            SensorType::META_DATA,
            1,
            ParamId::VERSION,
            ControlPayload::text("1.2.3"),
        ));
        let line = formatter.format_packet(&packet);
        assert!(line.starts_with("CTRL_RESP"));
        assert!(line.contains("\"1.2.3\""));
        assert!(line.contains("seq=1 param=0x19"));
    }

    #[test]
    fn test_received_time_when_enabled() {
        let formatter = PacketFormatter::new(true, true);
        let packet = LocalPacket::FlushComplete(SensorType::GYROSCOPE);
        let line: Value = serde_json::from_str(&formatter.format_packet(&packet)).unwrap();
        assert_eq!(line["kind"], "FLUSH_DONE");
        assert!(line["received"].is_string());
    }
}
