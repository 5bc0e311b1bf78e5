//! WebSocket transport
//!
//! `tokio-tungstenite` implementation of the [`Transport`] trait. The socket
//! is split into a write task draining the outbound frame channel and a read
//! task mapping inbound frames to [`TransportEvent`]s.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{
    Frame, Transport, TransportError, TransportEvent, TransportHandle, CLOSE_ABNORMAL,
    CLOSE_NO_STATUS,
};

/// WebSocket-backed [`Transport`].
#[derive(Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a new WebSocket transport
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<TransportHandle, TransportError> {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(%url, "WebSocket handshake complete");

        let (mut ws_write, mut ws_read) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let (event_tx, events) = mpsc::unbounded_channel::<TransportEvent>();

        // Write task: drains the frame channel until it closes, a close frame
        // is requested, or the socket rejects a write.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Frame::Text(text) => {
                        if ws_write.send(Message::Text(text.into())).await.is_err() {
                            warn!("WebSocket write failed, stopping write task");
                            break;
                        }
                    }
                    Frame::Close { code, reason } => {
                        let close = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = ws_write.send(Message::Close(Some(close))).await;
                        break;
                    }
                }
            }
        });

        // Read task: maps inbound frames to events until the peer goes away
        // or the event receiver is dropped.
        tokio::spawn(async move {
            loop {
                let event = match ws_read.next().await {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(text.to_string()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (u16::from(f.code), f.reason.to_string()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        };
                        let _ = event_tx.send(TransportEvent::Closed { code, reason });
                        break;
                    }
                    // Binary and control frames are not part of the chat protocol
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        // Peer vanished without a close handshake
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "connection reset".to_string(),
                        });
                        break;
                    }
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(TransportHandle { outbound, events })
    }
}
