//! Ranger Smart Order Router SDK for Rust: transaction observation.
//!
//! After a trade transaction is submitted, the SOR exposes a WebSocket
//! endpoint that reports its confirmation status. This crate provides a
//! client for that endpoint that keeps itself connected.
//!
//! # What This SDK Provides
//!
//! - A reconnecting transaction monitor: [`TransactionMonitor`]
//! - Typed protocol messages: [`ServerMessage`], [`ClientMessage`], [`TransactionUpdate`]
//! - Pluggable observers: [`MonitorHandler`], [`Callbacks`], [`ChannelHandler`]
//! - Event streams: [`TypedStream`] of [`MonitorEvent`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use sor_sdk::{MonitorConfig, MonitorEvent, TransactionMonitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sor_sdk::SorError> {
//!     let config = MonitorConfig::new("sk_test_limited456");
//!     let (monitor, mut events) = TransactionMonitor::with_events(config);
//!
//!     monitor.monitor("4zbKahoyXddoxPFqhU71iYTPJfrJQqKoCVFP7iUWfeNSPp2mBpgZQKoEDEh4GKFjb5Zij11WR2FZe7STX57nfSgv").await?;
//!
//!     while let Some(event) = events.next().await {
//!         if let MonitorEvent::Update(update) = event {
//!             println!("{} -> {:?}", update.signature, update.result);
//!             break;
//!         }
//!     }
//!
//!     monitor.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Protocol
//!
//! 1. The monitor connects to `{base_url}?tx_signature={signature}` with
//!    `Authorization: Bearer {api_key}` and subprotocol `obs-tx-v1`.
//! 2. It sends `connection_init` and waits for `connection_ack`.
//! 3. It subscribes the signature; the server then pushes `next` updates,
//!    and `complete` or `timeout` when it stops watching.
//! 4. A `ping` is sent every `keep_alive_interval` so the server does not
//!    drop the idle connection.
//! 5. If the connection drops, the monitor reconnects up to `max_reconnects`
//!    times and re-subscribes.
//!
//! # Logging
//!
//! This crate logs through the [`log`](https://docs.rs/log/) facade. Configure
//! any compatible logger in your binary and set `RUST_LOG=debug` to see
//! protocol traffic.
//!
//! # Errors
//!
//! Monitor failures are reported to [`MonitorHandler::on_error`] and logged.
//! Public methods also return [`SorError`], so callers can react to
//! configuration problems (`MissingSignature`, `MissingApiKey`) right away.
pub mod config;
pub mod errors;
pub mod handler;
pub mod models;
pub mod monitor;
pub mod transport;

// Re-export primary types for convenience.
pub use config::{MonitorConfig, DEFAULT_OBSERVE_URL, SUBPROTOCOL};
pub use errors::SorError;
pub use handler::{
    Callbacks, ChannelHandler, LoggingHandler, MonitorEvent, MonitorHandler, TypedStream,
};
pub use models::{
    ClientMessage, ConnectionState, ServerMessage, Subscription, TransactionUpdate,
};
pub use monitor::TransactionMonitor;
