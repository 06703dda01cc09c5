//! Integration tests for tracker-link
//!
//! Drive a [`tracker_link::Session`] through whole connection lifecycles
//! against an in-memory transport and a hand-driven clock, plus one run over
//! real UDP sockets on loopback.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration
//! cargo test --test integration --features inspection
//! ```

mod harness;
mod lifecycle;
mod negotiation;
mod sensor_sync;
mod udp_loopback;

pub use harness::TestHarness;
