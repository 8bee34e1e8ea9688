//! Connection session and listener registration
//!
//! Tracks where we are in the connect / reconnect cycle:
//!
//! ```text
//! Connecting ──connect──▶ Connected ──disconnect──▶ Reconnecting
//!      │                      ▲                          │
//!      └──────disconnect──────┼──────────────────────────┤
//!                             └──────────connect─────────┘
//! ```
//!
//! There is no terminal phase. While reconnecting, an attempt is due every
//! `reconnect_interval`; there is no backoff and no ceiling.

use std::fmt;
use std::time::Duration;

use tallyproto::{EventError, ListenerRegistration};
use tokio::time::Instant;

use crate::model::EndpointTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Initial attempt in progress
    Connecting,
    /// Transport is up and endpoints are registered
    Connected,
    /// Lost or never reached the server; retrying on a fixed interval
    Reconnecting,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSession {
    phase: SessionPhase,
    last_attempt_at: Instant,
    reconnect_interval: Duration,
    reconnects: u32,
}

impl ConnectionSession {
    pub fn new(now: Instant, reconnect_interval: Duration) -> Self {
        Self {
            phase: SessionPhase::Connecting,
            last_attempt_at: now,
            reconnect_interval,
            reconnects: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }

    /// Transport came up. Returns the previous phase.
    pub fn on_connect(&mut self) -> SessionPhase {
        let prev = self.phase;
        self.phase = SessionPhase::Connected;
        if prev == SessionPhase::Reconnecting {
            self.reconnects += 1;
        }
        prev
    }

    /// Transport went down. Returns true if this started a reconnect cycle;
    /// a repeat while already reconnecting keeps the running timer.
    pub fn on_disconnect(&mut self, now: Instant) -> bool {
        if self.phase == SessionPhase::Reconnecting {
            return false;
        }
        self.phase = SessionPhase::Reconnecting;
        self.last_attempt_at = now;
        true
    }

    /// Note that a connect attempt was issued.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt_at = now;
    }

    /// When the next reconnect attempt falls due, if we are reconnecting.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        (self.phase == SessionPhase::Reconnecting)
            .then(|| self.last_attempt_at + self.reconnect_interval)
    }

    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.next_attempt_at().is_some_and(|at| now >= at)
    }

    /// Successful reconnections since start.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

/// One registration per endpoint, in slot order.
pub fn registrations(endpoints: &EndpointTable) -> Vec<ListenerRegistration> {
    endpoints
        .iter()
        .map(|ep| ListenerRegistration::new(ep.assigned_id.as_deref(), ep.display_name.clone()))
        .collect()
}

/// Registration envelopes ready to send, in slot order.
pub fn registration_envelopes(endpoints: &EndpointTable) -> Result<Vec<String>, EventError> {
    registrations(endpoints)
        .iter()
        .map(ListenerRegistration::to_envelope)
        .collect()
}
