/// Authenticated WebSocket transport for the observation endpoint.
use futures_util::StreamExt;
use log::debug;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL,
};
use tokio_tungstenite::tungstenite::Message as WsMsg;
use url::Url;

use crate::config::SUBPROTOCOL;
use crate::errors::SorError;

pub(crate) type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMsg,
>;

pub(crate) type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Build `{base_url}?tx_signature={signature}`, keeping any query the base already has.
pub fn observe_url(base_url: &str, signature: &str) -> Result<Url, SorError> {
    let mut url = Url::parse(base_url)?;
    url.query_pairs_mut().append_pair("tx_signature", signature);
    Ok(url)
}

/// Open a WebSocket to `url` with bearer authentication and the `obs-tx-v1` subprotocol.
pub(crate) async fn open(url: &Url, api_key: &str) -> Result<(WsSink, WsStream), SorError> {
    let mut request = url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))?,
    );
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

    let (ws_stream, response) = tokio_tungstenite::connect_async(request).await?;
    debug!(
        "transport.open status={} protocol={:?}",
        response.status(),
        response.headers().get(SEC_WEBSOCKET_PROTOCOL)
    );
    Ok(ws_stream.split())
}

#[cfg(test)]
mod tests {
    use super::observe_url;

    #[test]
    fn appends_signature_query() {
        let url = observe_url("wss://example.com/v1/observe_tx", "4zbK").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/v1/observe_tx?tx_signature=4zbK");
    }

    #[test]
    fn keeps_existing_query() {
        let url = observe_url("ws://127.0.0.1:9000/observe?user_id=7", "SIG").unwrap();
        assert_eq!(url.query(), Some("user_id=7&tx_signature=SIG"));
    }

    #[test]
    fn rejects_relative_base() {
        assert!(observe_url("observe_tx", "SIG").is_err());
    }
}
