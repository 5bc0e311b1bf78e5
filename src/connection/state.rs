//! Connection state
//!
//! The lifecycle states driven by the connection manager, plus the
//! point-in-time status snapshot exposed to callers.

use serde::Serialize;
use std::fmt;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Before the first connect, or after an explicit disconnect
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// The channel is established and writable
    Open,
    /// The last attempt ended; a reconnect may be scheduled
    Closed,
    /// The retry budget is exhausted; only an explicit connect resumes
    Failed,
}

impl ConnectionState {
    /// Check if the channel currently accepts sends
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if a connection attempt is in flight
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Point-in-time view of the connection, updated with every transition.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// True while the channel accepts sends
    pub is_connected: bool,
    /// True while a connection attempt is in flight
    pub is_connecting: bool,
    /// Last recorded transport or retry error
    pub last_error: Option<String>,
    /// True once any attempt has reached `Open`
    pub has_ever_connected: bool,
    /// Failure-triggered reconnects scheduled since the last open or
    /// explicit disconnect
    pub retry_attempts: u32,
}
