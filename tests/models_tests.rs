/// Tests for protocol message decoding and monitor configuration.
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

use sor_sdk::config::{API_KEY_ENV, WS_URL_ENV};
use sor_sdk::*;

fn parse(value: serde_json::Value) -> ServerMessage {
    serde_json::from_value(value).unwrap()
}

// ---------------------------------------------------------------------------
// Server messages
// ---------------------------------------------------------------------------

#[test]
fn test_parse_connected_banner() {
    let msg = parse(json!({"type": "connected", "message": "Connected to mock WebSocket server"}));
    assert_eq!(
        msg,
        ServerMessage::Connected {
            message: Some("Connected to mock WebSocket server".into())
        }
    );
    assert_eq!(msg.kind(), "connected");
}

#[test]
fn test_parse_connection_ack_without_payload() {
    let msg = parse(json!({"type": "connection_ack"}));
    assert_eq!(msg, ServerMessage::ConnectionAck { payload: None });
}

#[test]
fn test_parse_next_with_full_payload() {
    let msg = parse(json!({
        "type": "next",
        "id": "4zbK",
        "payload": {
            "signature": "4zbK",
            "slot": 150005565,
            "timestamp": "1717000000000",
            "result": "Transaction was already confirmed",
            "maker_fee": 0.0025,
            "taker_fee": 0.004,
            "status": "monitoring"
        }
    }));

    let ServerMessage::Next { id, payload } = msg else {
        panic!("expected next, got {msg:?}");
    };
    assert_eq!(id.as_deref(), Some("4zbK"));
    assert_eq!(payload.signature, "4zbK");
    assert_eq!(payload.slot, Some(150005565));
    assert_eq!(payload.timestamp, Some(1717000000000));
    assert_eq!(payload.result.as_deref(), Some("Transaction was already confirmed"));
    assert_eq!(payload.maker_fee, Some(0.0025));
    assert_eq!(payload.taker_fee, Some(0.004));
    assert!(payload.is_monitoring());
}

#[test]
fn test_parse_next_with_minimal_payload() {
    let msg = parse(json!({"type": "next", "payload": {"signature": "SIG1"}}));
    let ServerMessage::Next { id, payload } = msg else {
        panic!("expected next");
    };
    assert!(id.is_none());
    assert_eq!(payload.slot, None);
    assert!(!payload.is_monitoring());
}

#[test]
fn test_next_without_signature_is_rejected() {
    let result = serde_json::from_value::<ServerMessage>(json!({
        "type": "next",
        "payload": {"slot": 1}
    }));
    assert!(result.is_err());
}

#[test]
fn test_parse_complete_and_timeout() {
    assert_eq!(
        parse(json!({"type": "complete", "id": "SIG1"})),
        ServerMessage::Complete { id: "SIG1".into() }
    );
    assert_eq!(
        parse(json!({
            "type": "timeout",
            "signature": "SIG1",
            "message": "Transaction monitoring timed out"
        })),
        ServerMessage::Timeout {
            signature: "SIG1".into(),
            message: Some("Transaction monitoring timed out".into())
        }
    );
}

#[test]
fn test_parse_pong() {
    let msg = parse(json!({"type": "pong"}));
    assert_eq!(msg.kind(), "pong");
    assert!(msg.error_detail().is_none());
}

#[test]
fn test_unknown_type_is_tolerated() {
    let msg = parse(json!({"type": "ka", "payload": {}}));
    assert_eq!(msg, ServerMessage::Unknown);
    assert_eq!(msg.kind(), "unknown");
}

#[test]
fn test_missing_type_is_rejected() {
    assert!(serde_json::from_value::<ServerMessage>(json!({"id": "SIG1"})).is_err());
    assert!(serde_json::from_str::<ServerMessage>("{not json").is_err());
}

#[test]
fn test_error_detail_prefers_message_then_payload() {
    let msg = parse(json!({"type": "error", "message": "Invalid subscription"}));
    assert_eq!(msg.error_detail().as_deref(), Some("Invalid subscription"));

    let msg = parse(json!({"type": "error", "payload": {"message": "Unknown message type"}}));
    assert_eq!(msg.error_detail().as_deref(), Some("Unknown message type"));

    let msg = parse(json!({"type": "connection_error", "payload": "unauthorized"}));
    assert_eq!(msg.error_detail().as_deref(), Some("unauthorized"));

    let msg = parse(json!({"type": "connection_error", "payload": {"code": 4401}}));
    assert_eq!(msg.error_detail().as_deref(), Some(r#"{"code":4401}"#));

    let msg = parse(json!({"type": "error"}));
    assert_eq!(msg.error_detail().as_deref(), Some("no details"));
}

// ---------------------------------------------------------------------------
// Client messages
// ---------------------------------------------------------------------------

#[test]
fn test_complete_message_wire_format() {
    let value = serde_json::to_value(ClientMessage::complete("SIG1")).unwrap();
    assert_eq!(value, json!({"type": "complete", "id": "SIG1"}));
    assert_eq!(ClientMessage::complete("SIG1").kind(), "complete");
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn test_error_classification() {
    assert!(SorError::MissingSignature.is_configuration());
    assert!(SorError::MissingApiKey.is_configuration());
    assert!(!SorError::NotConnected.is_configuration());
    assert!(SorError::WebSocketError("reset".into()).is_retryable());
    assert!(!SorError::MissingApiKey.is_retryable());
    assert!(SorError::InvalidConfig("keep_alive_interval".into()).is_configuration());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_config_defaults() {
    let config = MonitorConfig::default();
    assert_eq!(config.base_url, DEFAULT_OBSERVE_URL);
    assert_eq!(config.api_key, None);
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.reconnect_interval, Duration::from_secs(3));
    assert_eq!(config.max_reconnects, 5);
    assert_eq!(config.keep_alive_interval, Duration::from_secs(20));
    assert_eq!(config.init_poll_interval, Duration::from_millis(500));
}

#[test]
fn test_config_validate_rejects_zero_intervals() {
    assert!(MonitorConfig::default().validate().is_ok());

    let config = MonitorConfig {
        keep_alive_interval: Duration::ZERO,
        ..MonitorConfig::default()
    };
    assert!(matches!(config.validate(), Err(SorError::InvalidConfig(_))));

    let config = MonitorConfig {
        init_poll_interval: Duration::ZERO,
        ..MonitorConfig::default()
    };
    assert!(matches!(config.validate(), Err(SorError::InvalidConfig(_))));
}

#[test]
fn test_config_debug_redacts_api_key() {
    let config = MonitorConfig::new("sk_test_limited456");
    let printed = format!("{config:?}");
    assert!(!printed.contains("sk_test_limited456"));
    assert!(printed.contains("base_url"));
}

#[test]
#[serial]
fn test_config_from_env() {
    std::env::set_var(API_KEY_ENV, "sk_env_key");
    std::env::set_var(WS_URL_ENV, "ws://127.0.0.1:3000/observe");
    let config = MonitorConfig::from_env();
    assert_eq!(config.api_key.as_deref(), Some("sk_env_key"));
    assert_eq!(config.base_url, "ws://127.0.0.1:3000/observe");

    std::env::remove_var(API_KEY_ENV);
    std::env::set_var(WS_URL_ENV, "");
    let config = MonitorConfig::from_env();
    assert_eq!(config.api_key, None);
    assert_eq!(config.base_url, DEFAULT_OBSERVE_URL);
    std::env::remove_var(WS_URL_ENV);
}
