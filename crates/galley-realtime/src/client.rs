//! # Station Client
//!
//! Reconnecting client a station screen runs against the kitchen server.
//!
//! ## Reconnect Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      StationClient State Machine                        │
//! │                                                                         │
//! │   ┌──────────────┐  connect + register ok   ┌──────────────┐           │
//! │   │  Connecting  │─────────────────────────►│  Connected   │           │
//! │   │  (WS or SSE) │                          │              │           │
//! │   └──────▲───────┘                          │ 1. snapshot  │           │
//! │          │                                  │ 2. stream    │           │
//! │          │                                  └──────┬───────┘           │
//! │          │ sleep                                   │ error, close or   │
//! │   ┌──────┴───────┐                                 │ no frame for two  │
//! │   │   Backoff    │◄────────────────────────────────┘ heartbeat windows │
//! │   │ 0.5s → 30s   │                                                     │
//! │   └──────────────┘                                                     │
//! │                                                                         │
//! │   TransportPlan: after `fallback_after` consecutive failures on one    │
//! │   transport, switch to the other. A successful register resets it.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every (re)connect emits [`ClientEvent::Snapshot`] from the catch-up
//! endpoints before any streamed event, so the screen can rebuild its state.
//! A ticket may appear both in the snapshot and in a later `orderAdded`;
//! consumers key tickets by order id.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use galley_core::ticket::StationCommand;
use galley_core::{KitchenEvent, Ticket};

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::TransportKind;
use crate::protocol::{ClientFrame, ControlFrame, ErrorFrame, ServerFrame};

// =============================================================================
// Public Types
// =============================================================================

/// What the client reports to the station screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { transport: TransportKind },
    /// Catch-up state, sent after every (re)connect.
    Snapshot { open: Vec<Ticket>, history: Vec<Ticket> },
    Event(KitchenEvent),
    /// The server refused a command.
    CommandRejected { code: String, message: String },
    Disconnected { transport: TransportKind, reason: String },
}

/// Connection state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
        }
    }
}

/// Station client settings.
#[derive(Debug, Clone)]
pub struct StationClientConfig {
    /// `http(s)://host:port` of the kitchen server.
    pub server_url: Url,
    pub station_id: String,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failures before switching transport.
    pub fallback_after: u32,
    /// Server heartbeat interval; two silent windows mean the link is stale.
    pub heartbeat_interval: Duration,
    pub initial_transport: TransportKind,
}

impl StationClientConfig {
    pub fn from_config(config: &RealtimeConfig, station_id: impl Into<String>) -> RealtimeResult<Self> {
        let server_url = Url::parse(&config.client.server_url)?;
        Ok(StationClientConfig {
            server_url,
            station_id: station_id.into(),
            token: config.auth.token.clone(),
            connect_timeout: Duration::from_secs(config.client.connect_timeout_secs),
            initial_backoff: Duration::from_millis(config.client.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.client.max_backoff_secs),
            fallback_after: config.client.fallback_after,
            heartbeat_interval: config.hub.heartbeat_interval(),
            initial_transport: TransportKind::WebSocket,
        })
    }

    fn stale_after(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    /// Base URL extended with path segments.
    fn endpoint(&self, segments: &[&str]) -> RealtimeResult<Url> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| RealtimeError::InvalidUrl(self.server_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn ws_url(&self) -> RealtimeResult<Url> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::InvalidUrl(self.server_url.to_string()))?;
        Ok(url)
    }

    fn events_url(&self) -> RealtimeResult<Url> {
        let mut url = self.endpoint(&["events"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("stationId", &self.station_id);
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

// =============================================================================
// Transport Plan
// =============================================================================

/// Decides which transport the next connection attempt uses.
#[derive(Debug, Clone)]
pub struct TransportPlan {
    current: TransportKind,
    failures: u32,
    fallback_after: u32,
}

impl TransportPlan {
    pub fn new(initial: TransportKind, fallback_after: u32) -> Self {
        TransportPlan {
            current: initial,
            failures: 0,
            fallback_after: fallback_after.max(1),
        }
    }

    pub fn current(&self) -> TransportKind {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed or lost connection. Returns the transport to try next.
    pub fn record_failure(&mut self) -> TransportKind {
        self.failures += 1;
        if self.failures >= self.fallback_after {
            self.current = self.current.other();
            self.failures = 0;
        }
        self.current
    }

    /// Records a successful register.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }
}

// =============================================================================
// SSE Decoding
// =============================================================================

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    messages.push(SseMessage {
                        event: self.event.take(),
                        data: self.data.join("\n"),
                    });
                }
                self.event = None;
                self.data.clear();
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        messages
    }
}

// =============================================================================
// Client Handle
// =============================================================================

/// Handle for sending commands and stopping the client.
#[derive(Clone)]
pub struct ClientHandle {
    commands_tx: mpsc::Sender<(StationCommand, String)>,
    state: Arc<RwLock<ConnectionState>>,
    transport: Arc<RwLock<TransportKind>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ClientHandle {
    /// Queues a command. It is sent once a connection is up.
    pub async fn send(&self, command: StationCommand, order_id: impl Into<String>) -> RealtimeResult<()> {
        self.commands_tx
            .send((command, order_id.into()))
            .await
            .map_err(|_| RealtimeError::ChannelError("station client stopped".into()))
    }

    pub async fn bump(&self, order_id: impl Into<String>) -> RealtimeResult<()> {
        self.send(StationCommand::Bump, order_id).await
    }

    pub async fn recall(&self, order_id: impl Into<String>) -> RealtimeResult<()> {
        self.send(StationCommand::Recall, order_id).await
    }

    pub async fn mark_urgent(&self, order_id: impl Into<String>) -> RealtimeResult<()> {
        self.send(StationCommand::Urgent, order_id).await
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn transport(&self) -> TransportKind {
        *self.transport.read().await
    }

    pub async fn shutdown(&self) -> RealtimeResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| RealtimeError::ChannelError("station client stopped".into()))
    }
}

// =============================================================================
// Station Client
// =============================================================================

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Background task keeping one station connected.
pub struct StationClient {
    config: StationClientConfig,
    http: reqwest::Client,
    state: Arc<RwLock<ConnectionState>>,
    transport: Arc<RwLock<TransportKind>>,
    commands_rx: mpsc::Receiver<(StationCommand, String)>,
    events_tx: mpsc::Sender<ClientEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl StationClient {
    /// Spawns the client. Events arrive on the returned receiver.
    pub fn spawn(
        config: StationClientConfig,
    ) -> RealtimeResult<(ClientHandle, mpsc::Receiver<ClientEvent>, JoinHandle<()>)> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let transport = Arc::new(RwLock::new(config.initial_transport));

        let client = StationClient {
            config,
            http,
            state: state.clone(),
            transport: transport.clone(),
            commands_rx,
            events_tx,
            shutdown_rx,
        };
        let task = tokio::spawn(client.run());

        let handle = ClientHandle {
            commands_tx,
            state,
            transport,
            shutdown_tx,
        };
        Ok((handle, events_rx, task))
    }

    async fn run(mut self) {
        info!(
            station_id = %self.config.station_id,
            server = %self.config.server_url,
            "Station client starting"
        );

        let mut plan = TransportPlan::new(self.config.initial_transport, self.config.fallback_after);
        let mut backoff = self.create_backoff();

        loop {
            let transport = plan.current();
            *self.transport.write().await = transport;
            *self.state.write().await = ConnectionState::Connecting;

            let result = match transport {
                TransportKind::WebSocket => self.websocket_session(&mut plan, &mut backoff).await,
                TransportKind::Sse => self.sse_session(&mut plan, &mut backoff).await,
            };

            let error = match result {
                Ok(Flow::Shutdown) => break,
                Ok(Flow::Continue) => RealtimeError::Disconnected,
                Err(e) => e,
            };

            warn!(station_id = %self.config.station_id, %transport, error = %error, "Connection lost");
            *self.state.write().await = ConnectionState::Backoff;
            let reason = error.to_string();
            if self.emit(ClientEvent::Disconnected { transport, reason }).await == Flow::Shutdown {
                break;
            }

            if !error.is_retryable() {
                error!(station_id = %self.config.station_id, error = %error, "Giving up");
                break;
            }

            let next = plan.record_failure();
            if next != transport {
                info!(from = %transport, to = %next, "Switching transport");
            }

            let Some(delay) = backoff.next_backoff() else {
                error!("Backoff exhausted");
                break;
            };
            debug!(?delay, %next, "Waiting before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during backoff");
                    break;
                }
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        info!(station_id = %self.config.station_id, "Station client stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn emit(&self, event: ClientEvent) -> Flow {
        match self.events_tx.send(event).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Shutdown,
        }
    }

    /// Marks the link up, then emits `Connected` and the catch-up snapshot.
    async fn on_registered(
        &mut self,
        transport: TransportKind,
        plan: &mut TransportPlan,
        backoff: &mut ExponentialBackoff,
    ) -> RealtimeResult<Flow> {
        plan.record_success();
        backoff.reset();
        *self.state.write().await = ConnectionState::Connected;
        info!(station_id = %self.config.station_id, %transport, "Station connected");

        if self.emit(ClientEvent::Connected { transport }).await == Flow::Shutdown {
            return Ok(Flow::Shutdown);
        }
        let snapshot = self.fetch_snapshot().await?;
        Ok(self.emit(snapshot).await)
    }

    async fn dispatch(&self, frame: ServerFrame) -> Flow {
        match frame {
            ServerFrame::Kitchen(event) => self.emit(ClientEvent::Event(event)).await,
            ServerFrame::Control(ControlFrame::Error(ErrorFrame { code, message })) => {
                warn!(code = %code, message = %message, "Command rejected");
                self.emit(ClientEvent::CommandRejected { code, message }).await
            }
            ServerFrame::Control(ControlFrame::Ack(ack)) => {
                debug!(command = %ack.command, order_id = %ack.order_id, "Command acknowledged");
                Flow::Continue
            }
            ServerFrame::Control(_) => Flow::Continue,
        }
    }

    // =========================================================================
    // Catch-up
    // =========================================================================

    async fn fetch_snapshot(&self) -> RealtimeResult<ClientEvent> {
        let station = self.config.station_id.as_str();
        let open = self.get_tickets(self.config.endpoint(&["stations", station, "open"])?).await?;
        let history = self
            .get_tickets(self.config.endpoint(&["stations", station, "history"])?)
            .await?;
        debug!(open = open.len(), history = history.len(), "Snapshot fetched");
        Ok(ClientEvent::Snapshot { open, history })
    }

    async fn get_tickets(&self, url: Url) -> RealtimeResult<Vec<Ticket>> {
        let response = self.authorized(self.http.get(url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =========================================================================
    // WebSocket Session
    // =========================================================================

    async fn websocket_session(
        &mut self,
        plan: &mut TransportPlan,
        backoff: &mut ExponentialBackoff,
    ) -> RealtimeResult<Flow> {
        let url = self.config.ws_url()?;
        let connect_timeout = self.config.connect_timeout;
        let (stream, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| RealtimeError::Timeout(connect_timeout.as_secs()))??;
        let (mut sink, mut source) = stream.split();

        let register = ClientFrame::Register {
            station_id: self.config.station_id.clone(),
            token: self.config.token.clone(),
        };
        send_ws(&mut sink, &register).await?;

        // registration
        let deadline = Instant::now() + connect_timeout;
        loop {
            let message = tokio::select! {
                message = source.next() => message,
                _ = sleep_until(deadline) => return Err(RealtimeError::Timeout(connect_timeout.as_secs())),
            };
            let text = match message {
                Some(Ok(WsMessage::Text(text))) => text.to_string(),
                Some(Ok(WsMessage::Close(_))) | None => return Err(RealtimeError::Disconnected),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };
            match ServerFrame::from_json(&text)? {
                ServerFrame::Control(ControlFrame::Registered(_)) => break,
                ServerFrame::Control(ControlFrame::Error(frame)) => return Err(rejection(frame)),
                _ => continue,
            }
        }

        if self.on_registered(TransportKind::WebSocket, plan, backoff).await? == Flow::Shutdown {
            return Ok(Flow::Shutdown);
        }

        let stale = self.config.stale_after();
        let mut deadline = Instant::now() + stale;
        loop {
            tokio::select! {
                message = source.next() => {
                    let message = match message {
                        Some(message) => message?,
                        None => return Err(RealtimeError::Disconnected),
                    };
                    deadline = Instant::now() + stale;

                    let text = match message {
                        WsMessage::Text(text) => text.to_string(),
                        WsMessage::Binary(data) => String::from_utf8_lossy(&data).to_string(),
                        WsMessage::Close(_) => return Err(RealtimeError::Disconnected),
                        _ => continue,
                    };
                    let frame = match ServerFrame::from_json(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(error = %e, "Ignoring unreadable frame");
                            continue;
                        }
                    };
                    if frame.is_heartbeat() {
                        send_ws(&mut sink, &ClientFrame::Pong).await?;
                        continue;
                    }
                    if self.dispatch(frame).await == Flow::Shutdown {
                        return Ok(Flow::Shutdown);
                    }
                }
                command = self.commands_rx.recv() => match command {
                    Some((command, order_id)) => {
                        send_ws(&mut sink, &ClientFrame::for_command(command, order_id)).await?;
                    }
                    None => return Ok(Flow::Shutdown),
                },
                _ = self.shutdown_rx.recv() => {
                    let _ = sink.close().await;
                    return Ok(Flow::Shutdown);
                }
                _ = sleep_until(deadline) => return Err(RealtimeError::Stale(stale.as_secs())),
            }
        }
    }

    // =========================================================================
    // SSE Session
    // =========================================================================

    async fn sse_session(
        &mut self,
        plan: &mut TransportPlan,
        backoff: &mut ExponentialBackoff,
    ) -> RealtimeResult<Flow> {
        let url = self.config.events_url()?;
        let connect_timeout = self.config.connect_timeout;
        let response = timeout(
            connect_timeout,
            self.http
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| RealtimeError::Timeout(connect_timeout.as_secs()))??;
        let response = check_status(response).await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut registered = false;
        let stale = self.config.stale_after();
        let mut deadline = Instant::now() + connect_timeout;

        loop {
            tokio::select! {
                chunk = body.next() => {
                    let chunk = match chunk {
                        Some(chunk) => chunk?,
                        None => return Err(RealtimeError::Disconnected),
                    };
                    deadline = Instant::now() + stale;

                    for message in decoder.push(&chunk) {
                        let frame = match ServerFrame::from_json(&message.data) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!(error = %e, event = ?message.event, "Ignoring unreadable event");
                                continue;
                            }
                        };

                        if !registered {
                            if let ServerFrame::Control(ControlFrame::Registered(_)) = frame {
                                registered = true;
                                if self.on_registered(TransportKind::Sse, plan, backoff).await? == Flow::Shutdown {
                                    return Ok(Flow::Shutdown);
                                }
                            }
                            continue;
                        }
                        if self.dispatch(frame).await == Flow::Shutdown {
                            return Ok(Flow::Shutdown);
                        }
                    }
                }
                command = self.commands_rx.recv(), if registered => match command {
                    Some((command, order_id)) => {
                        if self.post_command(command, &order_id).await? == Flow::Shutdown {
                            return Ok(Flow::Shutdown);
                        }
                    }
                    None => return Ok(Flow::Shutdown),
                },
                _ = self.shutdown_rx.recv() => return Ok(Flow::Shutdown),
                _ = sleep_until(deadline) => {
                    return Err(if registered {
                        RealtimeError::Stale(stale.as_secs())
                    } else {
                        RealtimeError::Timeout(connect_timeout.as_secs())
                    });
                }
            }
        }
    }

    /// Sends a command over HTTP while streaming over SSE.
    async fn post_command(&self, command: StationCommand, order_id: &str) -> RealtimeResult<Flow> {
        let url = self.config.endpoint(&[
            "stations",
            &self.config.station_id,
            "tickets",
            order_id,
            command.as_str(),
        ])?;
        let response = self.authorized(self.http.post(url)).send().await?;

        if response.status().is_success() {
            debug!(%command, order_id = %order_id, "Command acknowledged");
            return Ok(Flow::Continue);
        }
        if response.status().is_server_error() {
            return Err(RealtimeError::Http(response.status().to_string()));
        }

        let status = response.status();
        let frame = response.json::<ErrorFrame>().await.unwrap_or(ErrorFrame {
            code: status.as_str().to_string(),
            message: status.to_string(),
        });
        warn!(code = %frame.code, message = %frame.message, "Command rejected");
        Ok(self
            .emit(ClientEvent::CommandRejected {
                code: frame.code,
                message: frame.message,
            })
            .await)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn send_ws(sink: &mut WsSink, frame: &ClientFrame) -> RealtimeResult<()> {
    sink.send(WsMessage::Text(frame.to_json()?.into())).await?;
    Ok(())
}

/// Maps a rejected register to a client error.
fn rejection(frame: ErrorFrame) -> RealtimeError {
    match frame.code.as_str() {
        "UNAUTHORIZED" => RealtimeError::Unauthorized,
        "FORBIDDEN" => RealtimeError::OriginRejected(frame.message),
        "NOT_FOUND" => RealtimeError::InvalidConfig(frame.message),
        _ => RealtimeError::ConnectionFailed(frame.message),
    }
}

async fn check_status(response: reqwest::Response) -> RealtimeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let frame = response.json::<ErrorFrame>().await.ok();
    let message = frame
        .map(|f| f.message)
        .unwrap_or_else(|| status.to_string());
    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => RealtimeError::Unauthorized,
        reqwest::StatusCode::FORBIDDEN => RealtimeError::OriginRejected(message),
        reqwest::StatusCode::NOT_FOUND => RealtimeError::InvalidConfig(message),
        _ => RealtimeError::Http(format!("{status}: {message}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthSettings, HubSettings};
    use crate::hub::StationHub;
    use crate::kitchen::KitchenService;
    use crate::server::{router, RealtimeState};
    use galley_core::{NewOrder, NewOrderItem};
    use galley_db::{seed_demo_kitchen, Database, DbConfig};

    #[test]
    fn test_transport_plan_falls_back_and_alternates() {
        let mut plan = TransportPlan::new(TransportKind::WebSocket, 3);
        assert_eq!(plan.record_failure(), TransportKind::WebSocket);
        assert_eq!(plan.record_failure(), TransportKind::WebSocket);
        assert_eq!(plan.record_failure(), TransportKind::Sse);
        assert_eq!(plan.failures(), 0);

        plan.record_failure();
        plan.record_success();
        assert_eq!(plan.failures(), 0);

        for _ in 0..2 {
            assert_eq!(plan.record_failure(), TransportKind::Sse);
        }
        assert_eq!(plan.record_failure(), TransportKind::WebSocket);
    }

    #[test]
    fn test_transport_plan_zero_threshold_switches_every_failure() {
        let mut plan = TransportPlan::new(TransportKind::Sse, 0);
        assert_eq!(plan.record_failure(), TransportKind::WebSocket);
        assert_eq!(plan.record_failure(), TransportKind::Sse);
    }

    #[test]
    fn test_sse_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: orderAdded\nda").is_empty());
        assert!(decoder.push(b"ta: {\"a\":1}\n").is_empty());
        let messages = decoder.push(b"\n: keep-alive\n\ndata: x\r\ndata: y\r\n\r\n");

        assert_eq!(
            messages,
            vec![
                SseMessage {
                    event: Some("orderAdded".to_string()),
                    data: "{\"a\":1}".to_string(),
                },
                SseMessage {
                    event: None,
                    data: "x\ny".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_urls() {
        let config = StationClientConfig::from_config(&RealtimeConfig::default(), "grill line").unwrap();
        assert_eq!(config.ws_url().unwrap().as_str(), "ws://127.0.0.1:8080/ws");
        assert_eq!(
            config.endpoint(&["stations", "grill line", "open"]).unwrap().as_str(),
            "http://127.0.0.1:8080/stations/grill%20line/open"
        );
        assert_eq!(
            config.events_url().unwrap().as_str(),
            "http://127.0.0.1:8080/events?stationId=grill+line"
        );
        assert_eq!(config.stale_after(), Duration::from_secs(20));
    }

    #[test]
    fn test_rejections_are_not_retryable() {
        let err = rejection(ErrorFrame {
            code: "UNAUTHORIZED".into(),
            message: "no".into(),
        });
        assert!(!err.is_retryable());
        let err = rejection(ErrorFrame {
            code: "INTERNAL_ERROR".into(),
            message: "boom".into(),
        });
        assert!(err.is_retryable());
    }

    // -------------------------------------------------------------------------
    // Against a live server
    // -------------------------------------------------------------------------

    async fn serve() -> (RealtimeState, Url) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_demo_kitchen(&db).await.unwrap();
        let hub = StationHub::new(&HubSettings::default());
        let kitchen = KitchenService::new(db, Arc::new(hub.clone())).await.unwrap();
        let auth = AuthSettings {
            token: Some("s3cret".to_string()),
            allowed_origins: Vec::new(),
        };
        let state = RealtimeState::new(Arc::new(kitchen), hub, auth);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (state, Url::parse(&format!("http://{addr}")).unwrap())
    }

    fn client_config(server_url: Url, transport: TransportKind) -> StationClientConfig {
        StationClientConfig {
            server_url,
            station_id: "grill".to_string(),
            token: Some("s3cret".to_string()),
            connect_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
            fallback_after: 3,
            heartbeat_interval: Duration::from_secs(10),
            initial_transport: transport,
        }
    }

    async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn place_burger(state: &RealtimeState) -> String {
        state
            .kitchen
            .place_order(&NewOrder {
                items: vec![NewOrderItem::new("burger", 1)],
                ..Default::default()
            })
            .await
            .unwrap()
            .order
            .id
    }

    async fn wait_for_history(state: &RealtimeState, expected: usize) {
        for _ in 0..100 {
            if state.kitchen.history("grill", None).await.unwrap().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("grill history never reached {expected}");
    }

    async fn exercise(transport: TransportKind) {
        let (state, url) = serve().await;
        let missed = place_burger(&state).await;

        let (handle, mut events, task) = StationClient::spawn(client_config(url, transport)).unwrap();

        assert_eq!(next_event(&mut events).await, ClientEvent::Connected { transport });
        match next_event(&mut events).await {
            ClientEvent::Snapshot { open, history } => {
                assert_eq!(open.len(), 1);
                assert_eq!(open[0].order_id, missed);
                assert!(history.is_empty());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
        assert_eq!(handle.state().await, ConnectionState::Connected);

        let live = place_burger(&state).await;
        match next_event(&mut events).await {
            ClientEvent::Event(KitchenEvent::OrderAdded(ticket)) => assert_eq!(ticket.order_id, live),
            other => panic!("expected orderAdded, got {other:?}"),
        }
        assert_eq!(
            next_event(&mut events).await,
            ClientEvent::Event(KitchenEvent::ReportsUpdated)
        );

        handle.bump(live.clone()).await.unwrap();
        wait_for_history(&state, 1).await;

        handle.mark_urgent(live).await.unwrap();
        match next_event(&mut events).await {
            ClientEvent::CommandRejected { code, .. } => assert_eq!(code, "NOT_PERMITTED"),
            other => panic!("expected rejection, got {other:?}"),
        }

        handle.shutdown().await.unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_websocket_session_end_to_end() {
        exercise(TransportKind::WebSocket).await;
    }

    #[tokio::test]
    async fn test_sse_session_end_to_end() {
        exercise(TransportKind::Sse).await;
    }

    #[tokio::test]
    async fn test_wrong_token_stops_client() {
        let (_state, url) = serve().await;
        let mut config = client_config(url, TransportKind::WebSocket);
        config.token = Some("wrong".to_string());

        let (_handle, mut events, task) = StationClient::spawn(config).unwrap();
        match next_event(&mut events).await {
            ClientEvent::Disconnected { reason, .. } => assert!(reason.contains("token")),
            other => panic!("expected disconnect, got {other:?}"),
        }
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
