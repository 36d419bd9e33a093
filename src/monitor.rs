/// Transaction monitor: a reconnecting client for the transaction observation stream.
///
/// Features:
/// - One authenticated connection per monitor, bound to a primary signature
/// - `connection_init` / `connection_ack` handshake before any subscription
/// - Subscription registry, re-issued after every reconnect
/// - Keepalive `ping` messages while the transport is open
/// - Bounded reconnects with a fixed delay
///
/// All state lives behind one mutex, so the reader, the keepalive task and the
/// timers handle events one at a time. Every task carries the connection
/// generation it was started for and does nothing once that generation is stale.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMsg;
use url::Url;

use crate::config::MonitorConfig;
use crate::errors::SorError;
use crate::handler::{ChannelHandler, MonitorEvent, MonitorHandler, TypedStream};
use crate::models::{ClientMessage, ConnectionState, ServerMessage, Subscription};
use crate::transport::{self, WsSink};

/// One physical connection. Replaced wholesale on reconnect.
struct Connection {
    generation: u64,
    sink: Option<WsSink>,
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl Connection {
    /// Stop the tasks of a connection that is being replaced.
    fn abort(self) {
        if let Some(keepalive) = self.keepalive {
            keepalive.abort();
        }
        self.reader.abort();
    }

    /// Drop a connection whose reader has already finished. Runs on the reader task itself.
    fn release(self) {
        if let Some(keepalive) = self.keepalive {
            keepalive.abort();
        }
    }

    /// Close the transport gracefully, then stop the tasks.
    async fn shutdown(mut self) {
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(WsMsg::Close(None)).await;
            let _ = sink.close().await;
        }
        self.reader.abort();
    }
}

struct MonitorInner {
    state: ConnectionState,
    generation: u64,
    connection: Option<Connection>,
    current_signature: Option<String>,
    reconnect_count: u32,
    reconnect_timer: Option<JoinHandle<()>>,
    subscriptions: BTreeMap<String, Subscription>,
}

impl MonitorInner {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            connection: None,
            current_signature: None,
            reconnect_count: 0,
            reconnect_timer: None,
            subscriptions: BTreeMap::new(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
            && self
                .connection
                .as_ref()
                .is_some_and(|c| c.generation == generation)
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    config: MonitorConfig,
    handler: Arc<dyn MonitorHandler>,
    inner: Mutex<MonitorInner>,
}

/// Client for the transaction observation WebSocket.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct TransactionMonitor {
    shared: Arc<Shared>,
}

impl TransactionMonitor {
    /// Create a monitor that reports to `handler`. No connection is opened yet.
    pub fn new(config: MonitorConfig, handler: impl MonitorHandler + 'static) -> Self {
        Self::with_handler(config, Arc::new(handler))
    }

    /// Create a monitor with a shared handler.
    pub fn with_handler(config: MonitorConfig, handler: Arc<dyn MonitorHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                inner: Mutex::new(MonitorInner::new()),
            }),
        }
    }

    /// Create a monitor whose events are delivered as a stream.
    pub fn with_events(config: MonitorConfig) -> (Self, TypedStream<MonitorEvent>) {
        let (handler, events) = ChannelHandler::new();
        (Self::new(config, handler), events)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Open a connection bound to `signature`, or to the last known signature.
    ///
    /// Returns once the connection attempt is started; the handshake completes
    /// in the background and is reported through `on_open`. Any existing
    /// connection is closed first and the reconnect counter is reset.
    pub async fn connect(&self, signature: Option<&str>) -> Result<(), SorError> {
        let mut inner = self.shared.inner.lock().await;
        let (signature, url) = prepare_connect(&self.shared, &inner, signature)?;
        discard_connection(&self.shared, &mut inner).await;
        connect_locked(&self.shared, &mut inner, signature, url);
        Ok(())
    }

    /// Start monitoring `signature` with the configured timeout.
    pub async fn monitor(&self, signature: &str) -> Result<(), SorError> {
        self.monitor_with_timeout(signature, self.shared.config.timeout)
            .await
    }

    /// Start monitoring `signature`.
    ///
    /// Switches the connection over if it is bound to another signature,
    /// connects if there is no connection, and waits (polling every
    /// `init_poll_interval`, for at most `timeout`) while the server has not
    /// yet acknowledged the connection. A `timeout` too large to represent
    /// as a deadline waits without limit.
    pub async fn monitor_with_timeout(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<(), SorError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.shared.inner.lock().await;
        monitor_locked(&self.shared, &mut inner, signature.to_string(), deadline).await
    }

    /// Send a `subscribe` for `signature` and register it.
    pub async fn subscribe(&self, signature: &str) -> Result<(), SorError> {
        let mut inner = self.shared.inner.lock().await;
        subscribe_locked(&mut inner, signature).await
    }

    /// Send a `complete` for `signature` and drop it from the registry.
    pub async fn unsubscribe(&self, signature: &str) -> Result<(), SorError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != ConnectionState::OpenInitialized {
            error!("monitor.unsubscribe signature={signature} connection not initialized");
            return Err(SorError::NotInitialized);
        }
        info!("monitor.unsubscribe signature={signature}");
        let result = send_message(&mut inner, &ClientMessage::complete(signature)).await;
        inner.subscriptions.remove(signature);
        result
    }

    /// Unsubscribe from `signature`, defaulting to the current signature.
    pub async fn stop_monitoring(&self, signature: Option<&str>) -> Result<(), SorError> {
        let signature = match signature {
            Some(s) => s.to_string(),
            None => self
                .current_signature()
                .await
                .ok_or(SorError::MissingSignature)?,
        };
        self.unsubscribe(&signature).await
    }

    /// Close the connection and cancel every timer. Does not reconnect.
    ///
    /// The subscription registry and current signature are kept, so a later
    /// `connect(None)` resumes where this left off.
    pub async fn close(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_reconnect();
        discard_connection(&self.shared, &mut inner).await;
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.inner.lock().await.state
    }

    /// True once the server has acknowledged the connection.
    pub async fn is_initialized(&self) -> bool {
        self.state().await == ConnectionState::OpenInitialized
    }

    pub async fn current_signature(&self) -> Option<String> {
        self.shared.inner.lock().await.current_signature.clone()
    }

    /// Every registered subscription, ordered by signature.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let inner = self.shared.inner.lock().await;
        inner.subscriptions.values().cloned().collect()
    }

    /// Signatures the server reports as actively monitored.
    pub async fn active_subscriptions(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().await;
        inner
            .subscriptions
            .values()
            .filter(|s| s.active)
            .map(|s| s.signature.clone())
            .collect()
    }

    pub async fn is_monitoring(&self, signature: &str) -> bool {
        let inner = self.shared.inner.lock().await;
        inner
            .subscriptions
            .get(signature)
            .is_some_and(|s| s.active)
    }

    /// Reconnect attempts made since the last successful open.
    pub async fn reconnect_count(&self) -> u32 {
        self.shared.inner.lock().await.reconnect_count
    }

    /// Connection generation; increases with every new connection and every `close`.
    pub async fn generation(&self) -> u64 {
        self.shared.inner.lock().await.generation
    }
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

/// Validate a connect request: a signature must be known and a credential configured.
fn prepare_connect(
    shared: &Shared,
    inner: &MonitorInner,
    signature: Option<&str>,
) -> Result<(String, Url), SorError> {
    let Some(signature) = signature
        .map(str::to_string)
        .or_else(|| inner.current_signature.clone())
    else {
        let err = SorError::MissingSignature;
        error!("monitor.connect {err}");
        return Err(err);
    };
    if !shared.config.has_api_key() {
        let err = SorError::MissingApiKey;
        error!("monitor.connect {err}");
        return Err(err);
    }
    shared.config.validate().map_err(|err| {
        error!("monitor.connect {err}");
        err
    })?;
    let url = transport::observe_url(&shared.config.base_url, &signature).map_err(|err| {
        error!("monitor.connect {err}");
        err
    })?;
    Ok((signature, url))
}

/// Caller-initiated connect: resets the reconnect budget.
fn connect_locked(shared: &Arc<Shared>, inner: &mut MonitorInner, signature: String, url: Url) {
    inner.cancel_reconnect();
    inner.current_signature = Some(signature);
    inner.reconnect_count = 0;
    start_connection(shared, inner, url);
}

/// Close the current connection on purpose. Its close never reaches the reconnect policy.
async fn discard_connection(shared: &Shared, inner: &mut MonitorInner) {
    inner.generation += 1;
    let Some(connection) = inner.connection.take() else {
        inner.state = ConnectionState::Disconnected;
        return;
    };
    let was_open = inner.state.is_open();
    inner.state = ConnectionState::Closing;
    info!("monitor.close generation={}", connection.generation);
    connection.shutdown().await;
    inner.state = ConnectionState::Disconnected;
    if was_open {
        shared.handler.on_close();
    }
}

fn start_connection(shared: &Arc<Shared>, inner: &mut MonitorInner, url: Url) {
    if let Some(old) = inner.connection.take() {
        old.abort();
    }
    inner.generation += 1;
    let generation = inner.generation;
    inner.state = ConnectionState::Connecting;
    info!("monitor.connect url={url} generation={generation}");

    let reader = spawn_connection(shared.clone(), generation, url);
    inner.connection = Some(Connection {
        generation,
        sink: None,
        reader,
        keepalive: None,
    });
}

fn spawn_connection(shared: Arc<Shared>, generation: u64, url: Url) -> JoinHandle<()> {
    tokio::spawn(run_connection(shared, generation, url))
}

async fn run_connection(shared: Arc<Shared>, generation: u64, url: Url) {
    let api_key = shared.config.api_key.clone().unwrap_or_default();
    let (sink, mut stream) = match transport::open(&url, &api_key).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!("monitor.handshake_failed generation={generation} error={err}");
            report_transport_error(&shared, generation, &err).await;
            handle_close(&shared, generation).await;
            return;
        }
    };

    if !handle_open(&shared, generation, sink).await {
        return;
    }

    loop {
        match stream.next().await {
            Some(Ok(WsMsg::Text(text))) => handle_text(&shared, generation, &text).await,
            Some(Ok(WsMsg::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => handle_text(&shared, generation, &text).await,
                Err(err) => warn!("monitor.parse_failed generation={generation} error={err}"),
            },
            Some(Ok(WsMsg::Ping(data))) => {
                let mut inner = shared.inner.lock().await;
                if inner.is_current(generation) {
                    let _ = send_frame(&mut inner, WsMsg::Pong(data)).await;
                }
            }
            Some(Ok(WsMsg::Close(frame))) => {
                debug!("monitor.close_frame generation={generation} frame={frame:?}");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                let err = SorError::from(err);
                warn!("monitor.read_failed generation={generation} error={err}");
                report_transport_error(&shared, generation, &err).await;
                break;
            }
            None => break,
        }
    }

    handle_close(&shared, generation).await;
}

async fn report_transport_error(shared: &Shared, generation: u64, err: &SorError) {
    let inner = shared.inner.lock().await;
    if inner.is_current(generation) {
        shared.handler.on_error(err);
    }
}

/// Transport is open: send `connection_init` and start the keepalive.
/// Returns false if this connection was superseded during the handshake.
async fn handle_open(shared: &Arc<Shared>, generation: u64, sink: WsSink) -> bool {
    let mut inner = shared.inner.lock().await;
    if !inner.is_current(generation) {
        debug!("monitor.open stale generation={generation}");
        return false;
    }
    if let Some(connection) = inner.connection.as_mut() {
        connection.sink = Some(sink);
    }
    inner.state = ConnectionState::OpenUninitialized;
    inner.reconnect_count = 0;
    info!("monitor.open generation={generation}");
    shared.handler.on_open();

    let _ = send_message(&mut inner, &ClientMessage::connection_init()).await;

    let keepalive = spawn_keepalive(shared.clone(), generation);
    if let Some(connection) = inner.connection.as_mut() {
        connection.keepalive = Some(keepalive);
    }
    true
}

/// Transport closed underneath a live connection: clean up and apply the reconnect policy.
async fn handle_close(shared: &Arc<Shared>, generation: u64) {
    let mut inner = shared.inner.lock().await;
    if !inner.is_current(generation) {
        debug!("monitor.close stale generation={generation}");
        return;
    }
    if let Some(connection) = inner.connection.take() {
        connection.release();
    }
    inner.state = ConnectionState::Disconnected;
    info!("monitor.closed generation={generation}");
    shared.handler.on_close();
    schedule_reconnect(shared, &mut inner);
}

fn schedule_reconnect(shared: &Arc<Shared>, inner: &mut MonitorInner) {
    let max = shared.config.max_reconnects;
    if inner.reconnect_count >= max {
        let err = SorError::ReconnectExhausted {
            attempts: inner.reconnect_count,
        };
        error!("monitor.reconnect {err}");
        shared.handler.on_error(&err);
        return;
    }

    inner.reconnect_count += 1;
    let delay = shared.config.reconnect_interval;
    let generation = inner.generation;
    info!(
        "monitor.reconnect attempt={}/{} delay_ms={}",
        inner.reconnect_count,
        max,
        delay.as_millis()
    );

    let shared_timer = shared.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let shared = shared_timer;
        let mut inner = shared.inner.lock().await;
        if inner.generation != generation || inner.connection.is_some() {
            debug!("monitor.reconnect stale generation={generation}");
            return;
        }
        inner.reconnect_timer = None;
        let Some(signature) = inner.current_signature.clone() else {
            return;
        };
        match transport::observe_url(&shared.config.base_url, &signature) {
            Ok(url) => start_connection(&shared, &mut inner, url),
            Err(err) => {
                error!("monitor.reconnect {err}");
                shared.handler.on_error(&err);
            }
        }
    });
    inner.reconnect_timer = Some(timer);
}

fn spawn_keepalive(shared: Arc<Shared>, generation: u64) -> JoinHandle<()> {
    let period = shared.config.keep_alive_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            let mut inner = shared.inner.lock().await;
            if !inner.is_current(generation) {
                break;
            }
            if inner.state.is_open() {
                let _ = send_message(&mut inner, &ClientMessage::Ping).await;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

async fn handle_text(shared: &Arc<Shared>, generation: u64, text: &str) {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            warn!("monitor.parse_failed generation={generation} error={err}");
            return;
        }
    };

    let mut inner = shared.inner.lock().await;
    if !inner.is_current(generation) {
        return;
    }
    debug!("monitor.recv type={}", message.kind());
    shared.handler.on_message(&message);

    match &message {
        ServerMessage::ConnectionAck { .. } => {
            inner.state = ConnectionState::OpenInitialized;
            info!("monitor.initialized generation={generation}");
            resubscribe(&mut inner).await;
        }
        ServerMessage::Next { payload, .. } => {
            shared.handler.on_update(payload);
            if payload.is_monitoring() {
                let signature = payload.signature.clone();
                inner
                    .subscriptions
                    .entry(signature.clone())
                    .or_insert_with(|| Subscription::new(signature.clone()))
                    .active = true;
                shared.handler.on_monitoring(&signature);
            }
        }
        ServerMessage::Complete { id } => {
            info!("monitor.complete signature={id}");
            inner.subscriptions.remove(id);
        }
        ServerMessage::Timeout { signature, message } => {
            info!("monitor.timeout signature={signature} message={message:?}");
            inner.subscriptions.remove(signature);
            shared.handler.on_timeout(signature);
        }
        ServerMessage::Error { .. } => {
            let detail = message.error_detail().unwrap_or_default();
            error!("monitor.server_error {detail}");
            shared.handler.on_error(&SorError::ServerError(detail));
        }
        ServerMessage::ConnectionError { .. } => {
            let detail = message.error_detail().unwrap_or_default();
            error!("monitor.connection_error {detail}");
            shared.handler.on_error(&SorError::ConnectionError(detail));
        }
        ServerMessage::Pong { .. } => debug!("monitor.pong"),
        ServerMessage::Connected { message } => {
            info!("monitor.connected message={message:?}");
        }
        ServerMessage::Unknown => debug!("monitor.recv unhandled message type"),
    }
}

/// Subscribe the primary signature, then re-issue every other registered one.
async fn resubscribe(inner: &mut MonitorInner) {
    let mut signatures: Vec<String> = inner.current_signature.iter().cloned().collect();
    signatures.extend(
        inner
            .subscriptions
            .keys()
            .filter(|s| inner.current_signature.as_ref() != Some(*s))
            .cloned(),
    );
    for signature in signatures {
        let _ = subscribe_locked(inner, &signature).await;
    }
}

async fn monitor_locked(
    shared: &Arc<Shared>,
    inner: &mut MonitorInner,
    signature: String,
    deadline: Option<Instant>,
) -> Result<(), SorError> {
    let switching = inner
        .current_signature
        .as_deref()
        .is_some_and(|current| current != signature);
    if switching {
        let (signature, url) = prepare_connect(shared, inner, Some(signature.as_str()))?;
        info!(
            "monitor.switch from={:?} to={signature}",
            inner.current_signature
        );
        discard_connection(shared, inner).await;
        connect_locked(shared, inner, signature, url);
        return Ok(());
    }

    match inner.state {
        ConnectionState::Disconnected | ConnectionState::Closing => {
            info!("monitor.monitor signature={signature} not connected, connecting now");
            let (signature, url) = prepare_connect(shared, inner, Some(signature.as_str()))?;
            connect_locked(shared, inner, signature, url);
            Ok(())
        }
        ConnectionState::Connecting | ConnectionState::OpenUninitialized => {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let err = SorError::InitTimeout { signature };
                error!("monitor.monitor {err}");
                shared.handler.on_error(&err);
                return Err(err);
            }
            debug!("monitor.monitor signature={signature} connection not yet initialized, waiting");
            schedule_monitor_retry(shared, signature, deadline, inner.generation);
            Ok(())
        }
        ConnectionState::OpenInitialized => {
            info!("monitor.monitor signature={signature}");
            subscribe_locked(inner, &signature).await
        }
    }
}

fn schedule_monitor_retry(
    shared: &Arc<Shared>,
    signature: String,
    deadline: Option<Instant>,
    generation: u64,
) {
    let shared = shared.clone();
    let delay = shared.config.init_poll_interval;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut inner = shared.inner.lock().await;
        if inner.generation != generation {
            debug!("monitor.monitor retry stale generation={generation}");
            return;
        }
        match inner.state {
            // The ack already subscribed it.
            ConnectionState::OpenInitialized if inner.subscriptions.contains_key(&signature) => {
                return;
            }
            // Lost before the ack; the next ack re-subscribes the current signature.
            ConnectionState::Disconnected | ConnectionState::Closing => return,
            _ => {}
        }
        if let Err(err) = monitor_locked(&shared, &mut inner, signature, deadline).await {
            debug!("monitor.monitor retry failed error={err}");
        }
    });
}

async fn subscribe_locked(inner: &mut MonitorInner, signature: &str) -> Result<(), SorError> {
    if inner.state != ConnectionState::OpenInitialized {
        error!("monitor.subscribe signature={signature} connection not initialized");
        return Err(SorError::NotInitialized);
    }
    info!("monitor.subscribe signature={signature}");
    send_message(inner, &ClientMessage::subscribe(signature)).await?;
    inner
        .subscriptions
        .entry(signature.to_string())
        .or_insert_with(|| Subscription::new(signature));
    Ok(())
}

async fn send_message(inner: &mut MonitorInner, message: &ClientMessage) -> Result<(), SorError> {
    let text = serde_json::to_string(message)?;
    debug!("monitor.send type={}", message.kind());
    send_frame(inner, WsMsg::Text(text)).await
}

async fn send_frame(inner: &mut MonitorInner, frame: WsMsg) -> Result<(), SorError> {
    let open = inner.state.is_open();
    let sink = match inner.connection.as_mut().and_then(|c| c.sink.as_mut()) {
        Some(sink) if open => sink,
        _ => {
            error!("monitor.send websocket not connected, cannot send message");
            return Err(SorError::NotConnected);
        }
    };
    sink.send(frame).await.map_err(|err| {
        let err = SorError::from(err);
        warn!("monitor.send failed error={err}");
        err
    })
}
