//! Wire protocol encoding/decoding
//!
//! JSON text envelopes exchanged with the chat server. Every frame carries a
//! `type` discriminator; server frames nest their payload under `data`.

use serde::{Deserialize, Serialize};

/// A message sent from the client to the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Chat message submitted by the user.
    Message { message: String },
    /// Keepalive probe.
    Ping,
}

impl ClientMessage {
    /// Build a chat message envelope
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Message {
            message: text.into(),
        }
    }
}

/// A message received from the chat server.
///
/// Servers may attach extra top-level fields to the envelope; they are
/// ignored during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Streamed assistant content. `is_complete` marks the final chunk of a
    /// response; its content is usually empty.
    Message {
        content: String,
        #[serde(default)]
        is_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Server-side error report.
    Error { message: String },
    /// Connection or processing status update.
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Keepalive acknowledgement.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Any envelope with an unrecognized `type` discriminator.
    #[serde(other)]
    Unknown,
}
