/// Wire models for the transaction observation protocol.
///
/// Every frame is a JSON object discriminated by its `type` field.
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize an optional value that may be a JSON number or a string containing a number.
/// Fractional numbers are rejected rather than truncated.
fn deserialize_optional_string_or_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {n}"))),
        Some(serde_json::Value::String(s)) => s.parse().map(Some).map_err(D::Error::custom),
        Some(serde_json::Value::Null) | None => Ok(None),
        Some(v) => Err(D::Error::custom(format!("expected number or string, got {v}"))),
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle of the monitor's single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport is open; `connection_init` sent, `connection_ack` not yet received.
    OpenUninitialized,
    /// Server acknowledged the connection; subscriptions are valid.
    OpenInitialized,
    Closing,
}

impl ConnectionState {
    /// True while the transport is open, initialized or not.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::OpenUninitialized | ConnectionState::OpenInitialized
        )
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Local record of interest in one transaction signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub signature: String,
    /// Set once the server reports the signature as actively monitored.
    pub active: bool,
}

impl Subscription {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            active: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Status value the server uses while it is watching a transaction.
pub const STATUS_MONITORING: &str = "monitoring";

/// Transaction status payload carried by `next` messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionUpdate {
    pub signature: String,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_u64")]
    pub slot: Option<u64>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "deserialize_optional_string_or_u64")]
    pub timestamp: Option<u64>,
    pub result: Option<String>,
    pub maker_fee: Option<f64>,
    pub taker_fee: Option<f64>,
    pub status: Option<String>,
}

impl TransactionUpdate {
    pub fn is_monitoring(&self) -> bool {
        self.status.as_deref() == Some(STATUS_MONITORING)
    }
}

/// Messages pushed by the observation server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome banner sent right after the handshake.
    Connected { message: Option<String> },
    ConnectionAck { payload: Option<serde_json::Value> },
    Next {
        id: Option<String>,
        payload: TransactionUpdate,
    },
    Complete { id: String },
    Error {
        payload: Option<serde_json::Value>,
        message: Option<String>,
    },
    ConnectionError {
        payload: Option<serde_json::Value>,
        message: Option<String>,
    },
    Pong { payload: Option<serde_json::Value> },
    Timeout {
        signature: String,
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::ConnectionAck { .. } => "connection_ack",
            ServerMessage::Next { .. } => "next",
            ServerMessage::Complete { .. } => "complete",
            ServerMessage::Error { .. } => "error",
            ServerMessage::ConnectionError { .. } => "connection_error",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Timeout { .. } => "timeout",
            ServerMessage::Unknown => "unknown",
        }
    }

    /// Human-readable detail of an `error` / `connection_error` message.
    pub fn error_detail(&self) -> Option<String> {
        match self {
            ServerMessage::Error { payload, message }
            | ServerMessage::ConnectionError { payload, message } => Some(
                message
                    .clone()
                    .or_else(|| payload.as_ref().map(describe_payload))
                    .unwrap_or_else(|| "no details".into()),
            ),
            _ => None,
        }
    }
}

fn describe_payload(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Payload of a `subscribe` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribePayload {
    pub signature: String,
}

/// Messages sent by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        payload: serde_json::Map<String, serde_json::Value>,
    },
    Ping,
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Complete { id: String },
}

impl ClientMessage {
    pub fn connection_init() -> Self {
        ClientMessage::ConnectionInit {
            payload: serde_json::Map::new(),
        }
    }

    /// Subscriptions use the signature as their id.
    pub fn subscribe(signature: &str) -> Self {
        ClientMessage::Subscribe {
            id: signature.to_string(),
            payload: SubscribePayload {
                signature: signature.to_string(),
            },
        }
    }

    pub fn complete(signature: &str) -> Self {
        ClientMessage::Complete {
            id: signature.to_string(),
        }
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::ConnectionInit { .. } => "connection_init",
            ClientMessage::Ping => "ping",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Complete { .. } => "complete",
        }
    }
}
