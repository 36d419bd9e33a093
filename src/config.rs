/// Configuration for the transaction observation endpoint.
use std::fmt;
use std::time::Duration;

use crate::errors::SorError;

/// Default transaction observation endpoint (staging).
pub const DEFAULT_OBSERVE_URL: &str =
    "wss://staging-sor-api-437363704888.asia-northeast1.run.app/v1/observe_tx";

/// WebSocket subprotocol negotiated with the observation endpoint.
pub const SUBPROTOCOL: &str = "obs-tx-v1";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "SOR_API_KEY";

/// Environment variable overriding the observation endpoint.
pub const WS_URL_ENV: &str = "WS_SERVER_URL";

/// Connection, reconnect and keepalive settings for a [`TransactionMonitor`](crate::TransactionMonitor).
#[derive(Clone)]
pub struct MonitorConfig {
    /// Observation endpoint; the signature is appended as `tx_signature`.
    pub base_url: String,
    /// Bearer credential sent in the `Authorization` header.
    pub api_key: Option<String>,
    /// How long `monitor` keeps waiting for connection initialization (default: 30s).
    pub timeout: Duration,
    /// Delay before each reconnect attempt (default: 3s).
    pub reconnect_interval: Duration,
    /// Maximum consecutive reconnect attempts (default: 5, 0 = never reconnect).
    pub max_reconnects: u32,
    /// Interval between `ping` messages while connected (default: 20s).
    pub keep_alive_interval: Duration,
    /// Delay between `monitor` retries while waiting for `connection_ack` (default: 500ms).
    pub init_poll_interval: Duration,
}

impl MonitorConfig {
    /// Default settings with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read the API key and endpoint from `SOR_API_KEY` and `WS_SERVER_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var(WS_URL_ENV) {
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        config
    }

    /// Reject intervals the monitor's timers cannot run with.
    pub fn validate(&self) -> Result<(), SorError> {
        if self.keep_alive_interval.is_zero() {
            return Err(SorError::InvalidConfig(
                "keep_alive_interval must be greater than zero".into(),
            ));
        }
        if self.init_poll_interval.is_zero() {
            return Err(SorError::InvalidConfig(
                "init_poll_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OBSERVE_URL.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(3),
            max_reconnects: 5,
            keep_alive_interval: Duration::from_secs(20),
            init_poll_interval: Duration::from_millis(500),
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_reconnects", &self.max_reconnects)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("init_poll_interval", &self.init_poll_interval)
            .finish()
    }
}
