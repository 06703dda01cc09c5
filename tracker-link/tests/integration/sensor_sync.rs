//! Sensor state sync across ticks and reconnects

use tracker_link::protocol::PacketType;
use tracker_link::sensor::{ConfigBits, SensorSnapshot, SensorStatus};

use crate::TestHarness;

/// Payload after type and sequence
fn body(datagram: &[u8]) -> &[u8] {
    &datagram[9..]
}

fn connected_with_sensor() -> TestHarness {
    let mut h = TestHarness::new();
    h.sensors.push(SensorSnapshot::new(0));
    h.connect_with_features(0);
    h.clear_sent();
    h
}

#[test]
fn offline_to_ok_sends_one_info_then_nothing() {
    let mut h = connected_with_sensor();

    // Offline with no config went out on connect
    let record = h.session.sync_record(0).unwrap();
    assert_eq!(record.status, Some(SensorStatus::Offline));

    h.sensors[0].status = SensorStatus::Ok;
    h.sensors[0].config = ConfigBits(0b0101);
    h.advance(10);

    let infos = h.sent_of(PacketType::SensorInfo);
    assert_eq!(infos.len(), 1);
    let info = body(&infos[0]);
    assert_eq!(info[0], 0);
    assert_eq!(info[1], SensorStatus::Ok as u8);
    assert_eq!(u16::from_be_bytes([info[3], info[4]]), 0b0101);

    h.clear_sent();
    h.advance(10);
    assert!(h.sent_of(PacketType::SensorInfo).is_empty());
}

#[test]
fn unchanged_sensor_stays_quiet() {
    let mut h = connected_with_sensor();
    h.advance_with_heartbeats(5000, 500);
    assert!(h.sent_of(PacketType::SensorInfo).is_empty());
}

#[test]
fn config_changes_are_coalesced() {
    let mut h = connected_with_sensor();
    h.sensors[0].status = SensorStatus::Ok;
    h.advance(10);
    h.clear_sent();

    // Two config flips inside one interval
    h.sensors[0].config = ConfigBits(ConfigBits::MAG_ENABLED);
    h.advance(100);
    h.sensors[0].config = ConfigBits(ConfigBits::MAG_ENABLED | ConfigBits::CALIBRATION_ENABLED);
    h.advance(100);
    assert!(h.sent_of(PacketType::SensorInfo).is_empty());

    h.server_says(tracker_link::protocol::ServerPacketType::Heartbeat, &[]);
    h.advance(800);
    let infos = h.sent_of(PacketType::SensorInfo);
    assert_eq!(infos.len(), 1);
    assert_eq!(&body(&infos[0])[3..5], &[0, 0b0101]);
}

#[test]
fn status_change_skips_coalescing() {
    let mut h = connected_with_sensor();
    h.sensors[0].status = SensorStatus::Ok;
    h.advance(10);
    h.clear_sent();

    h.sensors[0].status = SensorStatus::Error;
    h.advance(1);
    assert_eq!(h.sent_of(PacketType::SensorInfo).len(), 1);
}

#[test]
fn failed_info_is_retried() {
    let mut h = connected_with_sensor();
    h.transport.set_fail_flushes(true);
    h.sensors[0].status = SensorStatus::Ok;
    h.advance(10);
    assert_eq!(
        h.session.sync_record(0).unwrap().status,
        Some(SensorStatus::Offline)
    );

    h.transport.set_fail_flushes(false);
    h.advance(10);
    assert_eq!(h.sent_of(PacketType::SensorInfo).len(), 1);
    assert_eq!(h.session.sync_record(0).unwrap().status, Some(SensorStatus::Ok));
}

#[test]
fn reconnect_resends_full_state() {
    let mut h = connected_with_sensor();
    h.sensors.push(SensorSnapshot::new(1));
    h.sensors[0].status = SensorStatus::Ok;
    h.advance(10);

    h.session.reset();
    assert!(h.session.sync_record(0).unwrap().is_unset());
    h.clear_sent();

    h.connect();
    let infos = h.sent_of(PacketType::SensorInfo);
    let ids: Vec<u8> = infos.iter().map(|d| body(d)[0]).collect();
    assert_eq!(ids, vec![0, 1]);
}
