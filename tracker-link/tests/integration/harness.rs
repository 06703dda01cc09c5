//! Test harness playing the server side of a session
//!
//! Owns a session over a [`MockTransport`] and a [`ManualClock`], and keeps
//! the other handles so tests can inject server packets, move time and read
//! what the node sent.

use std::net::SocketAddr;

use tracker_link::config::LinkConfig;
use tracker_link::protocol::{HANDSHAKE_REPLY_PREFIX, PacketType, ServerPacketType};
use tracker_link::sensor::SensorSnapshot;
use tracker_link::{ConnectionState, ManualClock, MockTransport, Session};

/// Address the fake server answers from
pub const SERVER: &str = "192.168.4.2:6969";

pub struct TestHarness {
    pub session: Session<MockTransport, ManualClock>,
    pub transport: MockTransport,
    pub clock: ManualClock,
    pub sensors: Vec<SensorSnapshot>,
    server_sequence: u64,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let transport = MockTransport::new();
        let clock = ManualClock::new(0);
        let session = Session::new(transport.clone(), clock.clone(), &config);
        Self {
            session,
            transport,
            clock,
            sensors: Vec::new(),
            server_sequence: 0,
        }
    }

    pub fn server_addr() -> SocketAddr {
        SERVER.parse().unwrap()
    }

    /// Answer discovery and run the tick that connects
    pub fn connect(&mut self) {
        if self.session.state() != ConnectionState::Discovering {
            self.tick();
        }
        let mut reply = vec![ServerPacketType::Handshake as u8];
        reply.extend_from_slice(HANDSHAKE_REPLY_PREFIX);
        self.transport.inject(&reply, Self::server_addr());
        self.tick();
        assert!(self.session.is_connected(), "handshake did not connect");
    }

    /// Connect and answer feature negotiation with `features`
    pub fn connect_with_features(&mut self, features: u8) {
        self.connect();
        self.server_says(ServerPacketType::FeatureFlags, &[features]);
        self.tick();
    }

    pub fn tick(&mut self) {
        self.session.update(&self.sensors);
    }

    /// Move the clock forward and tick
    pub fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.tick();
    }

    /// Queue a packet from the server
    pub fn server_says(&mut self, kind: ServerPacketType, payload: &[u8]) {
        self.server_sequence += 1;
        let mut data = vec![kind as u8];
        data.extend_from_slice(&self.server_sequence.to_be_bytes());
        data.extend_from_slice(payload);
        self.transport.inject(&data, Self::server_addr());
    }

    /// Keep the link alive across a long idle stretch
    pub fn advance_with_heartbeats(&mut self, total_ms: u64, step_ms: u64) {
        let mut elapsed = 0;
        while elapsed < total_ms {
            self.server_says(ServerPacketType::Heartbeat, &[]);
            self.advance(step_ms);
            elapsed += step_ms;
        }
    }

    /// Datagrams of one packet type, in send order
    pub fn sent_of(&self, kind: PacketType) -> Vec<Vec<u8>> {
        self.transport
            .sent_datagrams()
            .into_iter()
            .filter(|d| d.first() == Some(&kind.id()))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.transport.take_sent();
    }
}
