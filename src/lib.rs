//! ChatStream Client Library
//!
//! A reconnecting WebSocket client for the ChatStream real-time chat service.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStatus};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
