//! Transport abstraction
//!
//! Decouples the connection manager from the underlying WebSocket so the
//! state machine can be driven by a scripted transport in tests. A transport
//! produces one [`TransportHandle`] per established connection; the manager
//! owns at most one handle at a time.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod ws;

pub use ws::WsTransport;

/// Normal (user-initiated) closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close handshake
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Error establishing the underlying transport resource.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL was rejected before any network activity
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    /// The handshake with the server failed
    #[error("connection failed: {0}")]
    Connect(String),
}

/// An outbound frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Close the connection with the given code
    Close { code: u16, reason: String },
}

/// A lifecycle or data event reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete inbound text frame
    Message(String),
    /// The connection closed; [`CLOSE_NORMAL`] means an intentional closure
    Closed { code: u16, reason: String },
    /// The connection failed mid-flight
    Error(String),
}

/// A live connection: one frame writer, one ordered event stream.
///
/// Dropping the handle releases the connection; the transport's background
/// tasks stop once they observe the closed channels.
#[derive(Debug)]
pub struct TransportHandle {
    /// Outbound frames, drained by the transport's write task
    pub outbound: mpsc::UnboundedSender<Frame>,
    /// Inbound events, delivered in arrival order
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Factory for live connections to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<TransportHandle, TransportError>;
}
