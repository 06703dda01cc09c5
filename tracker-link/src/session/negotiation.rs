//! Server feature negotiation
//!
//! After the handshake the node announces its own feature flags and waits for
//! the server's. Requests repeat every retry interval until the server answers
//! or the attempt ceiling is hit; after that the server is treated as having
//! no optional features for the rest of the session.

use crate::protocol::ServerFeatures;

/// Per-session negotiation state
#[derive(Debug, Clone)]
pub struct FeatureNegotiation {
    attempts: u8,
    last_request_at: Option<u64>,
    negotiated: Option<ServerFeatures>,
    max_attempts: u8,
    retry_interval_ms: u64,
    gave_up_logged: bool,
}

impl FeatureNegotiation {
    pub fn new(max_attempts: u8, retry_interval_ms: u64) -> Self {
        Self {
            attempts: 0,
            last_request_at: None,
            negotiated: None,
            max_attempts,
            retry_interval_ms,
            gave_up_logged: false,
        }
    }

    /// Forget everything learned from the previous server
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_request_at = None;
        self.negotiated = None;
        self.gave_up_logged = false;
    }

    /// Whether a request is due at `now`
    pub fn should_request(&self, now: u64) -> bool {
        if self.is_settled() {
            return false;
        }
        match self.last_request_at {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.retry_interval_ms,
        }
    }

    /// Count a request made at `now`
    pub fn record_request(&mut self, now: u64) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_request_at = Some(now);
    }

    /// Store the server's answer, returns false for a repeated answer
    pub fn on_reply(&mut self, features: ServerFeatures) -> bool {
        let first = self.negotiated.is_none();
        self.negotiated = Some(features);
        first
    }

    /// Answered or out of attempts
    pub fn is_settled(&self) -> bool {
        self.negotiated.is_some() || self.is_exhausted()
    }

    /// Out of attempts without an answer
    pub fn is_exhausted(&self) -> bool {
        self.negotiated.is_none() && self.attempts >= self.max_attempts
    }

    /// Returns true exactly once after exhaustion, for logging
    pub fn take_gave_up(&mut self) -> bool {
        if self.is_exhausted() && !self.gave_up_logged {
            self.gave_up_logged = true;
            return true;
        }
        false
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn negotiated(&self) -> Option<ServerFeatures> {
        self.negotiated
    }

    /// Negotiated set, empty while pending or after giving up
    pub fn features(&self) -> ServerFeatures {
        self.negotiated.unwrap_or_default()
    }
}
