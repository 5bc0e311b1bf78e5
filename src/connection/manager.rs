//! Connection manager
//!
//! Owns the single live transport handle, drives the connection state
//! machine, and schedules reconnect attempts with exponential backoff.
//!
//! All mutations run on one driver task; `connect`, `disconnect`, and `send`
//! never block and never panic across the public boundary. A generation
//! counter cancels scheduled reconnects: every new attempt and every explicit
//! disconnect bumps it, so a stale timer firing afterwards is a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use super::state::{ConnectionState, ConnectionStatus};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::transport::{
    Frame, Transport, TransportEvent, TransportHandle, WsTransport, CLOSE_NORMAL,
};

/// Callback invoked with every decoded server event, in arrival order.
pub type MessageHandler = Box<dyn Fn(ServerEvent) + Send + Sync>;

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint URL
    pub url: String,
    /// Delay before the first reconnect attempt
    pub base_delay: Duration,
    /// Ceiling on the reconnect delay
    pub max_delay: Duration,
    /// Reconnect attempts before giving up (`None` = retry forever)
    pub max_attempts: Option<u32>,
    /// Keepalive probe period
    pub ping_interval: Duration,
}

impl ConnectionConfig {
    /// Config with default timings for the given endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            ping_interval: Duration::from_secs(30),
        }
    }
}

enum Command {
    Connect,
    Disconnect,
    Retry { generation: u64 },
    Shutdown,
}

/// Mutable state shared between the caller-facing handle and the driver task.
struct Shared {
    state: ConnectionState,
    last_error: Option<String>,
    has_ever_connected: bool,
    /// Failure-triggered reconnects scheduled since the last open or
    /// explicit disconnect
    attempts: u32,
    /// Cancellation token for scheduled reconnects
    generation: u64,
    /// Writer for the single live transport handle
    writer: Option<mpsc::UnboundedSender<Frame>>,
}

struct Inner {
    config: ConnectionConfig,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    handler: Option<MessageHandler>,
    shared: RwLock<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

/// Reconnecting client connection to a chat server.
///
/// Owns at most one live transport handle at a time. Must be created inside
/// a tokio runtime; dropping the manager stops the driver task and releases
/// the connection.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Manager using the WebSocket transport.
    pub fn new(config: ConnectionConfig, handler: Option<MessageHandler>) -> Self {
        Self::with_transport(config, Arc::new(WsTransport::new()), handler)
    }

    /// Manager over a custom transport.
    pub fn with_transport(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        handler: Option<MessageHandler>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let policy = RetryPolicy::new(config.base_delay, config.max_delay, config.max_attempts);
        let inner = Arc::new(Inner {
            config,
            policy,
            transport,
            handler,
            shared: RwLock::new(Shared {
                state: ConnectionState::Idle,
                last_error: None,
                has_ever_connected: false,
                attempts: 0,
                generation: 0,
                writer: None,
            }),
            cmd_tx,
        });
        tokio::spawn(drive(inner.clone(), cmd_rx));
        Self { inner }
    }

    /// Start connecting. No-op while already open or connecting.
    pub fn connect(&self) {
        {
            let mut shared = self.inner.shared.write();
            if matches!(
                shared.state,
                ConnectionState::Open | ConnectionState::Connecting
            ) {
                return;
            }
            shared.state = ConnectionState::Connecting;
            shared.last_error = None;
        }
        let _ = self.inner.cmd_tx.send(Command::Connect);
    }

    /// Close the connection with a normal-closure code and cancel any pending
    /// reconnect. Idempotent; never followed by an automatic reconnect.
    pub fn disconnect(&self) {
        {
            let mut shared = self.inner.shared.write();
            shared.generation = shared.generation.wrapping_add(1);
            shared.state = ConnectionState::Idle;
            shared.last_error = None;
            shared.attempts = 0;
            if let Some(writer) = shared.writer.take() {
                let _ = writer.send(Frame::Close {
                    code: CLOSE_NORMAL,
                    reason: "client disconnect".to_string(),
                });
            }
        }
        let _ = self.inner.cmd_tx.send(Command::Disconnect);
    }

    /// Send a message over the open channel.
    ///
    /// Returns false without writing when the connection is not open; dropped
    /// messages are the caller's to resubmit.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let shared = self.inner.shared.read();
        if shared.state != ConnectionState::Open {
            warn!(state = %shared.state, "Cannot send, connection is not open");
            return false;
        }
        let Some(writer) = shared.writer.as_ref() else {
            warn!("Cannot send, transport writer is gone");
            return false;
        };
        match serde_json::to_string(message) {
            Ok(json) => writer.send(Frame::Text(json)).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound message");
                false
            }
        }
    }

    /// Point-in-time status snapshot
    pub fn status(&self) -> ConnectionStatus {
        let shared = self.inner.shared.read();
        ConnectionStatus {
            state: shared.state,
            is_connected: shared.state == ConnectionState::Open,
            is_connecting: shared.state == ConnectionState::Connecting,
            last_error: shared.last_error.clone(),
            has_ever_connected: shared.has_ever_connected,
            retry_attempts: shared.attempts,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.read().state
    }

    /// True while the channel accepts sends
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// True while a connection attempt is in flight
    pub fn is_connecting(&self) -> bool {
        self.state().is_connecting()
    }

    /// Last recorded transport or retry error
    pub fn last_error(&self) -> Option<String> {
        self.inner.shared.read().last_error.clone()
    }

    /// True once any attempt has reached `Open`
    pub fn has_ever_connected(&self) -> bool {
        self.inner.shared.read().has_ever_connected
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.inner.cmd_tx.send(Command::Shutdown);
    }
}

/// Driver task: processes commands, transport events, and keepalive ticks.
async fn drive(inner: Arc<Inner>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let mut events: Option<mpsc::UnboundedReceiver<TransportEvent>> = None;
    let mut ping: Option<Interval> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Connect) => {
                    // connect() moves the state to Connecting before queueing
                    // the command; anything else means a disconnect superseded
                    // this connect while it sat in the queue.
                    if inner.shared.read().state != ConnectionState::Connecting {
                        continue;
                    }
                    attempt(&inner, &mut events, &mut ping).await;
                }
                Some(Command::Retry { generation }) => {
                    let due = {
                        let shared = inner.shared.read();
                        generation == shared.generation
                            && shared.state == ConnectionState::Closed
                    };
                    if due {
                        attempt(&inner, &mut events, &mut ping).await;
                    } else {
                        debug!("Ignoring stale reconnect timer");
                    }
                }
                Some(Command::Disconnect) => {
                    events = None;
                    ping = None;
                }
                Some(Command::Shutdown) | None => break,
            },
            event = recv_event(&mut events), if events.is_some() => {
                match event {
                    Some(TransportEvent::Message(text)) => forward(&inner, &text),
                    Some(TransportEvent::Closed { code, reason }) => {
                        events = None;
                        ping = None;
                        on_closed(&inner, code, &reason);
                    }
                    Some(TransportEvent::Error(message)) => {
                        events = None;
                        ping = None;
                        on_transport_error(&inner, message);
                    }
                    None => {
                        events = None;
                        ping = None;
                        on_transport_error(&inner, "transport channel closed".to_string());
                    }
                }
            },
            _ = keepalive_tick(&mut ping), if ping.is_some() => send_ping(&inner),
        }
    }
}

async fn recv_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn keepalive_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Run one connection attempt. The previous handle is released first so at
/// most one transport handle is ever live.
async fn attempt(
    inner: &Arc<Inner>,
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
    ping: &mut Option<Interval>,
) {
    *events = None;
    *ping = None;

    let generation = {
        let mut shared = inner.shared.write();
        if !matches!(
            shared.state,
            ConnectionState::Connecting | ConnectionState::Closed
        ) {
            return;
        }
        shared.writer = None;
        shared.generation = shared.generation.wrapping_add(1);
        shared.state = ConnectionState::Connecting;
        shared.generation
    };

    info!(url = %inner.config.url, "Connecting to server");

    match inner.transport.connect(&inner.config.url).await {
        Ok(TransportHandle {
            outbound,
            events: event_rx,
        }) => {
            {
                let mut shared = inner.shared.write();
                if shared.generation != generation
                    || shared.state != ConnectionState::Connecting
                {
                    // Disconnected while the handshake was in flight
                    debug!("Discarding superseded connection");
                    let _ = outbound.send(Frame::Close {
                        code: CLOSE_NORMAL,
                        reason: "superseded".to_string(),
                    });
                    return;
                }
                shared.state = ConnectionState::Open;
                shared.has_ever_connected = true;
                shared.attempts = 0;
                shared.last_error = None;
                shared.writer = Some(outbound);
            }
            info!(url = %inner.config.url, "Connected to server");

            *events = Some(event_rx);
            let period = inner.config.ping_interval;
            let mut keepalive = interval_at(Instant::now() + period, period);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ping = Some(keepalive);
        }
        Err(e) => {
            let should_retry = {
                let mut shared = inner.shared.write();
                if shared.generation != generation {
                    false
                } else {
                    warn!(error = %e, "Connection attempt failed");
                    shared.last_error = Some(e.to_string());
                    shared.state = ConnectionState::Closed;
                    true
                }
            };
            if should_retry {
                schedule_retry(inner);
            }
        }
    }
}

fn on_closed(inner: &Arc<Inner>, code: u16, reason: &str) {
    let mut shared = inner.shared.write();
    shared.writer = None;
    if shared.state == ConnectionState::Idle {
        // User-initiated teardown already handled
        return;
    }
    if code == CLOSE_NORMAL {
        info!(code, "Connection closed");
        shared.state = ConnectionState::Idle;
        return;
    }
    warn!(code, %reason, "Connection lost");
    shared.last_error = Some(format!("connection closed abnormally (code {code})"));
    shared.state = ConnectionState::Closed;
    drop(shared);
    schedule_retry(inner);
}

fn on_transport_error(inner: &Arc<Inner>, message: String) {
    let mut shared = inner.shared.write();
    shared.writer = None;
    if shared.state == ConnectionState::Idle {
        return;
    }
    warn!(error = %message, "Transport error");
    shared.last_error = Some(message);
    shared.state = ConnectionState::Closed;
    drop(shared);
    schedule_retry(inner);
}

/// Schedule the next reconnect, or enter `Failed` when the budget is spent.
fn schedule_retry(inner: &Arc<Inner>) {
    let (delay, generation, attempt) = {
        let mut shared = inner.shared.write();
        if inner.policy.is_exhausted(shared.attempts) {
            let attempts = shared.attempts;
            shared.state = ConnectionState::Failed;
            shared.last_error = Some(format!("failed to reconnect after {attempts} attempts"));
            error!(attempts, "Retry budget exhausted, giving up");
            return;
        }
        let delay = inner.policy.delay_for(shared.attempts);
        shared.attempts += 1;
        (delay, shared.generation, shared.attempts)
    };

    info!(
        delay_ms = delay.as_millis() as u64,
        attempt, "Scheduling reconnect"
    );

    let cmd_tx = inner.cmd_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = cmd_tx.send(Command::Retry { generation });
    });
}

/// Decode an inbound frame and hand it to the registered handler.
///
/// Framing failures and unrecognized discriminators are logged and dropped;
/// everything else is forwarded in arrival order.
fn forward(inner: &Inner, text: &str) {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to parse server message");
            return;
        }
    };
    if matches!(event, ServerEvent::Unknown) {
        warn!("Unrecognized server message type");
        return;
    }
    if matches!(event, ServerEvent::Pong { .. }) {
        debug!("Keepalive acknowledged");
    }
    if let Some(handler) = &inner.handler {
        handler(event);
    }
}

fn send_ping(inner: &Inner) {
    let shared = inner.shared.read();
    if shared.state != ConnectionState::Open {
        return;
    }
    if let Some(writer) = shared.writer.as_ref() {
        if let Ok(json) = serde_json::to_string(&ClientMessage::Ping) {
            debug!("Sending keepalive ping");
            let _ = writer.send(Frame::Text(json));
        }
    }
}
