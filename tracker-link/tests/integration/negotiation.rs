//! Feature negotiation against silent and answering servers

use tracker_link::config::LinkConfig;
use tracker_link::protocol::{PacketType, ServerFeatures, ServerPacketType};

use crate::TestHarness;

#[test]
fn requests_stop_after_max_attempts() {
    let mut h = TestHarness::new();
    h.connect();

    // Server keeps the link alive but never answers
    h.advance_with_heartbeats(20_000, 250);

    let requests = h.sent_of(PacketType::FeatureFlags);
    assert_eq!(requests.len(), 15);
    assert!(h.session.negotiation().is_exhausted());
    assert_eq!(h.session.server_features(), ServerFeatures::none());

    h.clear_sent();
    h.advance_with_heartbeats(5_000, 250);
    assert!(h.sent_of(PacketType::FeatureFlags).is_empty());
}

#[test]
fn failed_requests_still_count() {
    let mut config = LinkConfig::default();
    config.timing.feature_max_attempts = 3;
    let mut h = TestHarness::with_config(config);
    h.connect();

    h.transport.set_fail_flushes(true);
    h.advance_with_heartbeats(3_000, 250);
    h.transport.set_fail_flushes(false);

    assert_eq!(h.session.negotiation().attempts(), 3);
    h.clear_sent();
    h.advance_with_heartbeats(2_000, 250);
    assert!(h.sent_of(PacketType::FeatureFlags).is_empty());
}

#[test]
fn retry_every_interval_until_answered() {
    let mut h = TestHarness::new();
    h.connect();
    assert_eq!(h.sent_of(PacketType::FeatureFlags).len(), 1);

    h.advance(499);
    assert_eq!(h.sent_of(PacketType::FeatureFlags).len(), 1);
    h.advance(1);
    assert_eq!(h.sent_of(PacketType::FeatureFlags).len(), 2);

    h.server_says(ServerPacketType::FeatureFlags, &[0b11]);
    h.tick();
    let features = h.session.server_features();
    assert!(features.has(ServerFeatures::PROTOCOL_BUNDLE_SUPPORT));
    assert!(features.has(ServerFeatures::PROTOCOL_BUNDLE_COMPACT_SUPPORT));

    h.advance_with_heartbeats(2_000, 250);
    assert_eq!(h.sent_of(PacketType::FeatureFlags).len(), 2);
}

#[test]
fn request_carries_node_features() {
    let mut h = TestHarness::new();
    h.connect();
    let request = &h.sent_of(PacketType::FeatureFlags)[0];
    // Sensor config support, bit 2
    assert_eq!(&request[9..], &[0b100]);
}
