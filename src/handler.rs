/// Observers for transaction monitor events.
///
/// The monitor calls its handler synchronously from the message-handling
/// path and never waits on anything beyond the call itself. Three ready-made
/// handlers are provided:
/// - [`LoggingHandler`]: logs every event (the trait's default behavior)
/// - [`Callbacks`]: closures for any subset of events, logging the rest
/// - [`ChannelHandler`]: forwards events into a [`TypedStream`]
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{error, info};
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::errors::SorError;
use crate::models::{ServerMessage, TransactionUpdate};

/// Receives transaction monitor events. Every method has a logging default.
pub trait MonitorHandler: Send + Sync {
    fn on_open(&self) {
        info!("monitor.on_open websocket connected");
    }

    fn on_close(&self) {
        info!("monitor.on_close websocket disconnected");
    }

    fn on_error(&self, error: &SorError) {
        error!("monitor.on_error {error}");
    }

    /// Every decoded server message, before type-specific dispatch.
    fn on_message(&self, message: &ServerMessage) {
        info!("monitor.on_message type={}", message.kind());
    }

    fn on_update(&self, update: &TransactionUpdate) {
        info!(
            "monitor.on_update signature={} slot={:?} status={:?} result={:?}",
            update.signature, update.slot, update.status, update.result
        );
    }

    fn on_timeout(&self, signature: &str) {
        info!("monitor.on_timeout signature={signature}");
    }

    fn on_monitoring(&self, signature: &str) {
        info!("monitor.on_monitoring signature={signature}");
    }
}

/// Handler that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl MonitorHandler for LoggingHandler {}

// ---------------------------------------------------------------------------
// Closures
// ---------------------------------------------------------------------------

type Hook = Box<dyn Fn() + Send + Sync>;
type RefHook<T> = Box<dyn Fn(&T) + Send + Sync>;
type StrHook = Box<dyn Fn(&str) + Send + Sync>;

/// Closure-based handler. Unset callbacks fall back to logging.
///
/// ```rust
/// use sor_sdk::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .with_update(|update| println!("update for {}", update.signature))
///     .with_monitoring(|signature| println!("watching {signature}"));
/// # let _ = callbacks;
/// ```
#[derive(Default)]
pub struct Callbacks {
    open: Option<Hook>,
    close: Option<Hook>,
    error: Option<RefHook<SorError>>,
    message: Option<RefHook<ServerMessage>>,
    update: Option<RefHook<TransactionUpdate>>,
    timeout: Option<StrHook>,
    monitoring: Option<StrHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    pub fn with_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&SorError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_message(mut self, f: impl Fn(&ServerMessage) + Send + Sync + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    pub fn with_update(mut self, f: impl Fn(&TransactionUpdate) + Send + Sync + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_timeout(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.timeout = Some(Box::new(f));
        self
    }

    pub fn with_monitoring(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.monitoring = Some(Box::new(f));
        self
    }
}

impl MonitorHandler for Callbacks {
    fn on_open(&self) {
        match &self.open {
            Some(f) => f(),
            None => LoggingHandler.on_open(),
        }
    }

    fn on_close(&self) {
        match &self.close {
            Some(f) => f(),
            None => LoggingHandler.on_close(),
        }
    }

    fn on_error(&self, error: &SorError) {
        match &self.error {
            Some(f) => f(error),
            None => LoggingHandler.on_error(error),
        }
    }

    fn on_message(&self, message: &ServerMessage) {
        match &self.message {
            Some(f) => f(message),
            None => LoggingHandler.on_message(message),
        }
    }

    fn on_update(&self, update: &TransactionUpdate) {
        match &self.update {
            Some(f) => f(update),
            None => LoggingHandler.on_update(update),
        }
    }

    fn on_timeout(&self, signature: &str) {
        match &self.timeout {
            Some(f) => f(signature),
            None => LoggingHandler.on_timeout(signature),
        }
    }

    fn on_monitoring(&self, signature: &str) {
        match &self.monitoring {
            Some(f) => f(signature),
            None => LoggingHandler.on_monitoring(signature),
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// One monitor callback, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Open,
    Close,
    Error(SorError),
    Message(ServerMessage),
    Update(TransactionUpdate),
    Timeout(String),
    Monitoring(String),
}

/// A typed stream of monitor events.
pub struct TypedStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Stream for TypedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Handler that forwards every event into an unbounded channel.
///
/// Events are dropped silently once the stream has been dropped.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, TypedStream<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, TypedStream { rx })
    }

    fn emit(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }
}

impl MonitorHandler for ChannelHandler {
    fn on_open(&self) {
        self.emit(MonitorEvent::Open);
    }

    fn on_close(&self) {
        self.emit(MonitorEvent::Close);
    }

    fn on_error(&self, error: &SorError) {
        self.emit(MonitorEvent::Error(error.clone()));
    }

    fn on_message(&self, message: &ServerMessage) {
        self.emit(MonitorEvent::Message(message.clone()));
    }

    fn on_update(&self, update: &TransactionUpdate) {
        self.emit(MonitorEvent::Update(update.clone()));
    }

    fn on_timeout(&self, signature: &str) {
        self.emit(MonitorEvent::Timeout(signature.to_string()));
    }

    fn on_monitoring(&self, signature: &str) {
        self.emit(MonitorEvent::Monitoring(signature.to_string()));
    }
}
