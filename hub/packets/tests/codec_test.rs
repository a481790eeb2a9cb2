//! Wire codec tests for sensorhub-packets

use proptest::prelude::*;
use sensorhub_core::{HubError, SensorType};
use sensorhub_packets::*;

fn samples() -> [SensorPacket; 10] {
    [
        SensorPacket::new(
            SensorType::GYROSCOPE_RAW,
            0xDEAD_BEEF,
            SensorPayload::Raw { axis: [-3, 0, 32000] },
        ),
        SensorPacket::new(
            SensorType::MAGNETIC_FIELD_UNCALIBRATED,
            1_000_000_123,
            SensorPayload::Uncalibrated {
                axis: [1 << 24, -(1 << 20), 7],
                offset: None,
            },
        ),
        SensorPacket::new(
            SensorType::ACCELEROMETER_UNCALIBRATED,
            1_000_000_124,
            SensorPayload::Uncalibrated {
                axis: [10, 20, 30],
                offset: Some([-1, -2, -3]),
            },
        ),
        SensorPacket::new(
            SensorType::ACCELEROMETER,
            u64::MAX - 5,
            SensorPayload::Calibrated { axis: [0, -1, i32::MAX] },
        ),
        SensorPacket::new(
            SensorType::GAME_ROTATION_VECTOR,
            42,
            SensorPayload::Quaternion { quat: [1, 2, 3, i32::MIN] },
        ),
        SensorPacket::new(
            SensorType::ORIENTATION,
            43,
            SensorPayload::Orientation {
                pitch: -90,
                roll: 45,
                yaw: 359,
            },
        ),
        SensorPacket::new(
            SensorType::GRAVITY,
            44,
            SensorPayload::ThreeAxis { axis: [0, 0, 164_626_227] },
        ),
        SensorPacket::new(
            SensorType::SIGNIFICANT_MOTION,
            45,
            SensorPayload::SignificantMotion { detected: 1 },
        ),
        SensorPacket::new(
            SensorType::STEP_COUNTER,
            46,
            SensorPayload::StepCounter { total: 0x0102_0304_0506_0708 },
        ),
        SensorPacket::new(
            SensorType::STEP_DETECTOR,
            47,
            SensorPayload::StepDetector { detected: 1 },
        ),
    ]
}

#[test]
fn test_sensor_packets_survive_the_wire() {
    for crc in [false, true] {
        for sample in samples() {
            let mut out = [0u8; MAX_HIF_PACKET_SIZE];
            let len = format_sensor_packet(&mut out, &sample, crc).unwrap();
            assert_eq!(crc_flag(&out), crc);

            let parsed = parse_packet(&out[..len]).unwrap();
            assert_eq!(parsed.size, len);
            assert_eq!(parsed.packet, LocalPacket::Sensor(sample));
        }
    }
}

/// Every payload kind filled with one boundary magnitude per width
fn boundary_samples(i: usize) -> [SensorPacket; 11] {
    let h = [0, i16::MIN, i16::MAX, -1][i];
    let w = [0, i32::MIN, i32::MAX, -1][i];
    let d = [0, 0, u64::MAX, u64::MAX][i];
    let b = [0, 0, u8::MAX, u8::MAX][i];
    let raw_time = [0, 0, u32::MAX as u64, u32::MAX as u64][i];

    let packet = SensorPacket::new;
    [
        packet(SensorType::ACCELEROMETER_RAW, raw_time, SensorPayload::Raw { axis: [h; 3] }),
        packet(
            SensorType::GYROSCOPE_UNCALIBRATED,
            d,
            SensorPayload::Uncalibrated { axis: [w; 3], offset: None },
        ),
        packet(
            SensorType::MAGNETIC_FIELD_UNCALIBRATED,
            d,
            SensorPayload::Uncalibrated { axis: [w; 3], offset: Some([w; 3]) },
        ),
        packet(SensorType::ACCELEROMETER, d, SensorPayload::Calibrated { axis: [w; 3] }),
        packet(SensorType::ROTATION_VECTOR, d, SensorPayload::Quaternion { quat: [w; 4] }),
        packet(
            SensorType::ORIENTATION,
            d,
            SensorPayload::Orientation { pitch: w, roll: w, yaw: w },
        ),
        packet(SensorType::LINEAR_ACCELERATION, d, SensorPayload::ThreeAxis { axis: [w; 3] }),
        packet(
            SensorType::SIGNIFICANT_MOTION,
            d,
            SensorPayload::SignificantMotion { detected: b },
        ),
        packet(SensorType::STEP_COUNTER, d, SensorPayload::StepCounter { total: d }),
        packet(SensorType::STEP_COUNTER, d, SensorPayload::StepCounter { total: u64::MAX - d }),
        packet(SensorType::STEP_DETECTOR, d, SensorPayload::StepDetector { detected: b }),
    ]
}

#[test]
fn test_boundary_values_survive_the_wire() {
    for i in 0..4 {
        for crc in [false, true] {
            for sample in boundary_samples(i) {
                let mut out = [0u8; MAX_HIF_PACKET_SIZE];
                let len = format_sensor_packet(&mut out, &sample, crc).unwrap();
                let parsed = parse_packet(&out[..len]).unwrap();
                assert_eq!(parsed.size, len, "{:?} crc={}", sample, crc);
                assert_eq!(parsed.packet, LocalPacket::Sensor(sample), "crc={}", crc);
            }
        }
    }
}

#[test]
fn test_packet_sizes_on_the_wire() {
    let expected = [13, 23, 35, 23, 27, 23, 23, 12, 19, 12];
    for (sample, size) in samples().iter().zip(expected) {
        let mut out = [0u8; MAX_HIF_PACKET_SIZE];
        assert_eq!(format_sensor_packet(&mut out, sample, false), Ok(size));
        assert_eq!(format_sensor_packet(&mut out, sample, true), Ok(size + CRC_SIZE));
    }
}

#[test]
fn test_raw_timestamp_keeps_low_word() {
    let sample = SensorPacket::new(
        SensorType::MAGNETIC_FIELD_RAW,
        0x0000_0001_8000_0000,
        SensorPayload::Raw { axis: [0; 3] },
    );
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_sensor_packet(&mut out, &sample, false).unwrap();
    match parse_packet(&out[..len]).unwrap().packet {
        LocalPacket::Sensor(p) => assert_eq!(p.timestamp, 0x8000_0000),
        other => panic!("unexpected packet {:?}", other),
    }
}

#[test]
fn test_test_data_packets() {
    let sample = samples()[3];
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_test_packet(&mut out, &sample, true).unwrap();
    assert_eq!(packet_id(&out), Some(PacketId::TestData));
    assert_eq!(
        parse_packet(&out[..len]).unwrap().packet,
        LocalPacket::TestData(sample)
    );
}

#[test]
fn test_private_sensor_flag() {
    let sample = SensorPacket::new(
        SensorType::ACCELEROMETER.private(),
        7,
        SensorPayload::Calibrated { axis: [1, 2, 3] },
    );
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_sensor_packet(&mut out, &sample, false).unwrap();
    assert_eq!(out[0] & 0x01, 0x01);
    assert_eq!(parse_packet(&out[..len]).unwrap().packet.sensor(), sample.sensor);
}

#[test]
fn test_crc_detects_bit_flip() {
    let sample = samples()[4];
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_sensor_packet(&mut out, &sample, true).unwrap();
    out[10] ^= 0x04;

    let err = parse_packet(&out[..len]).unwrap_err();
    assert_eq!(err.error, HubError::InvalidCrc);
    assert_eq!(err.size, len);
    assert_eq!(HubError::from(err), HubError::InvalidCrc);
}

#[test]
fn test_truncated_packet_reports_size() {
    let sample = samples()[8];
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_sensor_packet(&mut out, &sample, true).unwrap();

    let err = parse_packet(&out[..len - 1]).unwrap_err();
    assert_eq!(err.error, HubError::BufferTooSmall);
    assert_eq!(err.size, len);
}

#[test]
fn test_trailing_bytes_are_not_consumed() {
    let mut out = [0u8; 64];
    let first = format_flush_complete(&mut out, SensorType::ACCELEROMETER, true).unwrap();
    let second = format_sensor_packet(&mut out[first..], &samples()[7], false).unwrap();

    let parsed = parse_packet(&out[..first + second]).unwrap();
    assert_eq!(parsed.size, first);
    assert_eq!(
        parsed.packet,
        LocalPacket::FlushComplete(SensorType::ACCELEROMETER)
    );

    let parsed = parse_packet(&out[first..first + second]).unwrap();
    assert_eq!(parsed.packet, LocalPacket::Sensor(samples()[7]));
}

#[test]
fn test_control_requests() {
    let requests = [
        ControlPacket::enable(SensorType::GYROSCOPE, 1, true),
        ControlPacket::batch(SensorType::GYROSCOPE, 2, 10_000_000, 500_000_000),
        ControlPacket::flush(SensorType::GYROSCOPE, 3),
        ControlPacket::read(SensorType::GYROSCOPE, 4, ParamId::SENSOR_NAME),
        ControlPacket::write(
            SensorType::ACCELEROMETER,
            5,
            ParamId::F_SKOR_MATRIX,
            ControlPayload::words(&[1, 0, 0, 0, 1, 0, 0, 0, 1]).unwrap(),
        ),
        ControlPacket::write(
            SensorType::ACCELEROMETER,
            6,
            ParamId::F_NONLINEAR_EFFECTS,
            ControlPayload::halfwords(&[-1; 12]).unwrap(),
        ),
        ControlPacket::write(
            SensorType::ACCELEROMETER,
            7,
            ParamId::AXIS_MAPPING,
            ControlPayload::bytes(&[2, 0, 1]).unwrap(),
        ),
        ControlPacket::config_done(SensorType::META_DATA, 8),
    ];
    let sizes = [5, 20, 4, 4, 40, 28, 7, 4];

    for (request, size) in requests.iter().zip(sizes) {
        for crc in [false, true] {
            let mut out = [0u8; MAX_HIF_PACKET_SIZE];
            let len = format_control_packet(&mut out, request, crc).unwrap();
            assert_eq!(len, size + if crc { CRC_SIZE } else { 0 });

            let parsed = parse_packet(&out[..len]).unwrap();
            assert_eq!(parsed.size, len);
            assert_eq!(parsed.packet, LocalPacket::Control(request.clone()));
        }
    }
}

#[test]
fn test_control_responses() {
    let name = ControlPacket::response(
        SensorType::ACCELEROMETER,
        9,
        ParamId::SENSOR_NAME,
        ControlPayload::text("accel"),
    );
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    let len = format_control_packet(&mut out, &name, true).unwrap();
    assert_eq!(len, 38);
    match parse_packet(&out[..len]).unwrap().packet {
        LocalPacket::Control(p) => assert_eq!(p.payload.as_text(), Some("accel")),
        other => panic!("unexpected packet {:?}", other),
    }

    let len = format_error_response(&mut out, SensorType::ACCELEROMETER, 9, -4, true).unwrap();
    assert_eq!(len, 10);
    match parse_packet(&out[..len]).unwrap().packet {
        LocalPacket::Control(p) => {
            assert_eq!(p.packet_id, PacketId::ControlResp);
            assert_eq!(p.sequence, 9);
            assert_eq!(p.error_code(), Some(-4));
        }
        other => panic!("unexpected packet {:?}", other),
    }

    // a response to a write-only parameter carries nothing
    let ack = ControlPacket::response(
        SensorType::ACCELEROMETER,
        1,
        ParamId::ENABLE,
        ControlPayload::Empty,
    );
    assert_eq!(format_control_packet(&mut out, &ack, false), Ok(4));
}

#[test]
fn test_largest_packet_fits() {
    let packet = ControlPacket::response(
        SensorType::ACCELEROMETER,
        1,
        ParamId::F_SKOR_MATRIX,
        ControlPayload::words(&[i32::MIN; 9]).unwrap(),
    );
    let mut out = [0u8; MAX_HIF_PACKET_SIZE];
    assert_eq!(
        format_control_packet(&mut out, &packet, true),
        Ok(MAX_HIF_PACKET_SIZE)
    );
}

proptest! {
    #[test]
    fn prop_calibrated_round_trip(
        axis in any::<[i32; 3]>(),
        timestamp in any::<u64>(),
        crc in any::<bool>(),
    ) {
        let sample = SensorPacket::new(
            SensorType::GYROSCOPE,
            timestamp,
            SensorPayload::Calibrated { axis },
        );
        let mut out = [0u8; MAX_HIF_PACKET_SIZE];
        let len = format_sensor_packet(&mut out, &sample, crc).unwrap();
        let parsed = parse_packet(&out[..len]).unwrap();
        prop_assert_eq!(parsed.packet, LocalPacket::Sensor(sample));
    }

    #[test]
    fn prop_parser_never_overreads(bytes in proptest::collection::vec(any::<u8>(), 0..48)) {
        match parse_packet(&bytes) {
            Ok(parsed) => prop_assert!(parsed.size <= bytes.len()),
            Err(err) => prop_assert!(err.size == 0 || err.error != HubError::BufferTooSmall || err.size > bytes.len()),
        }
    }
}
