//! In-process WebSocket chat server used by the integration tests.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use chatstream_client::connection::{ConnectionConfig, MessageHandler};
use chatstream_client::protocol::ServerEvent;

/// Handle to a spawned chat server.
pub struct ChatServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    kill_tx: broadcast::Sender<()>,
}

impl ChatServer {
    pub fn url(&self) -> String {
        format!("ws://{}/ws/chat", self.addr)
    }

    /// WebSocket connections established so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Keepalive pings received so far
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Drop every live connection without a close handshake, simulating a
    /// network failure.
    pub fn kill_connections(&self) {
        let _ = self.kill_tx.send(());
    }
}

/// Spawn a chat server that echoes messages back as streamed deltas.
///
/// The first `refuse_first` TCP connections are dropped before the WebSocket
/// handshake completes.
pub async fn spawn_chat_server(refuse_first: usize) -> ChatServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let pings = Arc::new(AtomicUsize::new(0));
    let (kill_tx, _) = broadcast::channel(4);

    let accepted_task = accepted.clone();
    let pings_task = pings.clone();
    let kill_task = kill_tx.clone();
    tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            seen += 1;
            if seen <= refuse_first {
                drop(stream);
                continue;
            }
            let accepted = accepted_task.clone();
            let pings = pings_task.clone();
            let kill_rx = kill_task.subscribe();
            tokio::spawn(async move {
                let _ = handle_connection(stream, accepted, pings, kill_rx).await;
            });
        }
    });

    ChatServer {
        addr,
        accepted,
        pings,
        kill_tx,
    }
}

async fn handle_connection(
    stream: TcpStream,
    accepted: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    mut kill_rx: broadcast::Receiver<()>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    accepted.fetch_add(1, Ordering::SeqCst);

    // Greeting the real server sends on accept
    send_json(
        &mut ws,
        serde_json::json!({
            "type": "status",
            "data": {"status": "connected", "message": "Successfully connected to chat server"},
        }),
    )
    .await?;

    loop {
        tokio::select! {
            msg = ws.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str())
                        else {
                            continue;
                        };
                        match value["type"].as_str() {
                            Some("message") => {
                                let user_text =
                                    value["message"].as_str().unwrap_or_default().to_string();
                                if user_text == "bye" {
                                    ws.close(Some(CloseFrame {
                                        code: CloseCode::Normal,
                                        reason: "goodbye".into(),
                                    }))
                                    .await?;
                                    break;
                                }
                                send_json(
                                    &mut ws,
                                    serde_json::json!({
                                        "type": "status",
                                        "data": {
                                            "status": "processing",
                                            "message": "Processing your message...",
                                        },
                                    }),
                                )
                                .await?;
                                for chunk in ["Echo: ", user_text.as_str()] {
                                    send_json(
                                        &mut ws,
                                        serde_json::json!({
                                            "type": "message",
                                            "data": {"content": chunk, "is_complete": false},
                                        }),
                                    )
                                    .await?;
                                }
                                send_json(
                                    &mut ws,
                                    serde_json::json!({
                                        "type": "message",
                                        "data": {"content": "", "is_complete": true},
                                    }),
                                )
                                .await?;
                            }
                            Some("ping") => {
                                pings.fetch_add(1, Ordering::SeqCst);
                                send_json(
                                    &mut ws,
                                    serde_json::json!({"type": "pong", "data": {}}),
                                )
                                .await?;
                            }
                            _ => {
                                send_json(
                                    &mut ws,
                                    serde_json::json!({
                                        "type": "error",
                                        "data": {"message": "Unknown message type"},
                                    }),
                                )
                                .await?;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = kill_rx.recv() => {
                // Drop without a close handshake
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn send_json(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    value: serde_json::Value,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    ws.send(Message::Text(value.to_string().into())).await
}

/// Manager config with test-friendly timings.
pub fn fast_config(url: impl Into<String>) -> ConnectionConfig {
    ConnectionConfig {
        url: url.into(),
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_attempts: None,
        ping_interval: Duration::from_secs(30),
    }
}

/// Handler that records every forwarded event.
pub fn collector() -> (MessageHandler, Arc<Mutex<Vec<ServerEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handler: MessageHandler = Box::new(move |event| sink.lock().push(event));
    (handler, events)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
