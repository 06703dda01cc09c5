//! Connection lifecycle: discovery, liveness, reset and framing failures

use tracker_link::config::LinkConfig;
use tracker_link::protocol::{HANDSHAKE_REPLY_PREFIX, PacketType, ServerPacketType};
use tracker_link::sensor::{SensorSnapshot, SensorStatus};
use tracker_link::{ConnectionState, Error};

use crate::TestHarness;

#[test]
fn discovery_until_reply() {
    let mut h = TestHarness::new();
    h.tick();
    assert_eq!(h.session.state(), ConnectionState::Discovering);
    h.advance(1000);
    assert_eq!(h.sent_of(PacketType::Handshake).len(), 2);

    h.connect();
    assert_eq!(h.session.server_address(), TestHarness::server_addr());
    // Handshakes use sequence 0 and never advance the counter
    assert!(
        h.sent_of(PacketType::Handshake)
            .iter()
            .all(|d| d[1..9] == [0u8; 8])
    );
}

#[test]
fn silence_disconnects_and_clears_caches() {
    let mut h = TestHarness::new();
    h.sensors.push(SensorSnapshot {
        status: SensorStatus::Ok,
        ..SensorSnapshot::new(0)
    });
    h.connect_with_features(0b01);
    assert!(h.session.server_features().bits() != 0);
    assert!(!h.session.sync_record(0).unwrap().is_unset());

    h.advance(3001);
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
    assert_eq!(h.session.server_features().bits(), 0);
    assert_eq!(h.session.negotiation().attempts(), 0);
    assert!(h.session.sync_record(0).unwrap().is_unset());
    assert_eq!(h.session.stats().timeouts, 1);

    // Next tick looks for the last known server again
    h.clear_sent();
    h.tick();
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, TestHarness::server_addr());
}

#[test]
fn reset_drops_open_bundle() {
    let mut h = TestHarness::new();
    h.connect();
    h.session.begin_bundle().unwrap();
    h.session.send_sensor_tap(0, 1).unwrap();

    h.clear_sent();
    h.session.reset();
    assert!(!h.session.is_bundling());
    assert!(h.sent_of(PacketType::Bundle).is_empty());
}

#[test]
fn stale_bundle_flushed_by_next_tick() {
    let mut h = TestHarness::new();
    h.connect();
    h.session.begin_bundle().unwrap();
    h.session.send_sensor_tap(0, 1).unwrap();

    h.clear_sent();
    h.tick();
    let bundles = h.sent_of(PacketType::Bundle);
    assert_eq!(bundles.len(), 1);
    assert_eq!(&bundles[0][9..11], &[0, 1]);
}

#[test]
fn telemetry_refused_after_timeout() {
    let mut h = TestHarness::new();
    h.connect();
    h.session.send_temperature(0, 30.0).unwrap();

    h.advance(4000);
    assert!(matches!(
        h.session.send_temperature(0, 30.0),
        Err(Error::NotConnected)
    ));
}

#[test]
fn write_failure_sends_nothing() {
    let mut h = TestHarness::new();
    h.connect();
    h.clear_sent();
    let before = h.session.sequence();

    h.transport.set_fail_writes(true);
    assert!(h.session.send_flex_data(0, 0.5).is_err());
    assert!(h.transport.sent().is_empty());
    assert!(h.transport.staged().is_empty());
    assert_eq!(h.session.sequence(), before);
    assert!(h.session.last_transport_error().is_some());

    h.transport.set_fail_writes(false);
    h.session.send_flex_data(0, 0.5).unwrap();
    assert_eq!(h.session.sequence(), before + 1);
}

#[test]
fn sequence_is_monotonic_across_mixed_traffic() {
    let mut h = TestHarness::new();
    h.connect_with_features(0);
    h.clear_sent();
    let start = h.session.sequence();

    h.session.send_sensor_tap(0, 1).unwrap();
    h.session.begin_bundle().unwrap();
    h.session.send_sensor_tap(0, 2).unwrap();
    h.session.send_sensor_tap(1, 2).unwrap();
    h.session.end_bundle().unwrap();
    h.server_says(ServerPacketType::Heartbeat, &[]);
    h.tick();

    let sequences: Vec<u64> = h
        .transport
        .sent_datagrams()
        .iter()
        .map(|d| u64::from_be_bytes(d[1..9].try_into().unwrap()))
        .collect();
    assert_eq!(sequences, vec![start + 1, start + 2, start + 3]);
}

#[test]
fn reset_returns_to_configured_server() {
    let mut h = TestHarness::new();
    h.connect();
    h.session.reset();
    assert_eq!(h.session.state(), ConnectionState::Disconnected);

    h.clear_sent();
    h.tick();
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_ne!(sent[0].1, TestHarness::server_addr());
}

#[test]
fn stale_reply_after_reset_is_ignored() {
    let mut h = TestHarness::new();
    h.connect();
    h.session.reset();
    h.clear_sent();

    // Old server's reply still queued in the socket
    let mut reply = vec![ServerPacketType::Handshake as u8];
    reply.extend_from_slice(HANDSHAKE_REPLY_PREFIX);
    h.transport.inject(&reply, TestHarness::server_addr());
    h.tick();

    assert_eq!(h.session.state(), ConnectionState::Discovering);
    assert_eq!(h.session.stats().connects, 1);
    let configured = LinkConfig::default().server.socket_addr();
    assert_eq!(h.session.server_address(), configured);
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0[0], PacketType::Handshake.id());
    assert_eq!(sent[0].1, configured);
}

#[test]
fn discovery_timeout_matches_liveness_comparison() {
    let mut h = TestHarness::new();
    h.tick();
    h.advance(3000);
    assert_eq!(h.session.state(), ConnectionState::Discovering);
    h.advance(1);
    assert_eq!(h.session.state(), ConnectionState::Disconnected);
}
