/// Error types for the SOR SDK.
///
/// Every failure the transaction monitor can report maps to one variant here,
/// grouped by where it comes from: local configuration, connection state,
/// the server, or the transport.
use thiserror::Error;

/// The primary error type for the SOR SDK.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SorError {
    // Configuration
    #[error("No transaction signature provided")]
    MissingSignature,

    #[error("API key is required for authentication")]
    MissingApiKey,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Connection state
    #[error("WebSocket not connected, cannot send message")]
    NotConnected,

    #[error("Connection not initialized")]
    NotInitialized,

    #[error("Timed out waiting for connection initialization to monitor {signature}")]
    InitTimeout { signature: String },

    #[error("Max reconnection attempts reached ({attempts})")]
    ReconnectExhausted { attempts: u32 },

    // Server-reported
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    // Transport errors
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl SorError {
    /// Returns true for errors caused by missing or invalid configuration.
    /// These abort a connection attempt and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SorError::MissingSignature
                | SorError::MissingApiKey
                | SorError::InvalidUrl(_)
                | SorError::InvalidConfig(_)
        )
    }

    /// Returns true if the reconnect policy (or a caller retry) may recover from this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SorError::WebSocketError(_)
                | SorError::ConnectionError(_)
                | SorError::NotConnected
                | SorError::NotInitialized
        )
    }
}

impl From<serde_json::Error> for SorError {
    fn from(err: serde_json::Error) -> Self {
        SorError::JsonError(err.to_string())
    }
}

impl From<url::ParseError> for SorError {
    fn from(err: url::ParseError) -> Self {
        SorError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SorError::WebSocketError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue> for SorError {
    fn from(err: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue) -> Self {
        SorError::Other(format!("Invalid header value: {err}"))
    }
}
