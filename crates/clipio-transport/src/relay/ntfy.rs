//! ntfy-compatible relay: publish over HTTP POST, subscribe over WebSocket.

use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace};

use super::{RelayAdapter, Subscription};
use crate::config::RelayEndpoints;
use crate::error::RelayError;

/// ntfy.sh turns longer bodies into file attachments, which subscribers only
/// see as a notice text.
const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

/// One JSON frame on an ntfy subscription socket.
///
/// Besides `message` events the server sends `open` and `keepalive` frames,
/// which carry no body.
#[derive(Debug, Deserialize)]
struct NtfyFrame {
    event: String,
    #[serde(default)]
    message: Option<String>,
}

/// Extract the published body from a subscription frame, if it carries one.
fn message_body(frame: &str) -> Option<String> {
    match serde_json::from_str::<NtfyFrame>(frame) {
        Ok(NtfyFrame {
            event,
            message: Some(message),
        }) if event == "message" => Some(message),
        Ok(frame) => {
            trace!(event = %frame.event, "Skipping relay control frame");
            None
        }
        Err(e) => {
            debug!(error = %e, "Skipping unparsable relay frame");
            None
        }
    }
}

/// Client for an ntfy server.
#[derive(Debug, Clone)]
pub struct NtfyRelay {
    http: reqwest::Client,
    endpoints: RelayEndpoints,
    max_message_bytes: usize,
}

impl NtfyRelay {
    pub fn new(endpoints: RelayEndpoints) -> Result<Self, RelayError> {
        if !(endpoints.http_url.starts_with("http://") || endpoints.http_url.starts_with("https://"))
        {
            return Err(RelayError::InvalidEndpoint(format!(
                "publish URL must be http(s): {}",
                endpoints.http_url
            )));
        }
        if !(endpoints.ws_url.starts_with("ws://") || endpoints.ws_url.starts_with("wss://")) {
            return Err(RelayError::InvalidEndpoint(format!(
                "subscribe URL must be ws(s): {}",
                endpoints.ws_url
            )));
        }

        // reqwest and tungstenite both need a process-wide rustls provider.
        // `Err` means one is installed already.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoints,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        })
    }

    /// Override the server's inline message limit.
    #[must_use]
    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    pub const fn endpoints(&self) -> &RelayEndpoints {
        &self.endpoints
    }
}

impl RelayAdapter for NtfyRelay {
    async fn subscribe(&self, channel_id: &str) -> Result<Subscription, RelayError> {
        let url = self.endpoints.subscribe_url(channel_id);
        debug!(%url, "Opening relay subscription");
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        let stream = ws.filter_map(|msg| async move {
            match msg {
                Ok(WsMessage::Text(text)) => message_body(text.as_str()).map(Ok),
                Ok(WsMessage::Close(_)) => Some(Err(RelayError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(RelayError::Connection(e.to_string()))),
            }
        });
        Ok(stream.boxed())
    }

    async fn publish(&self, channel_id: &str, body: String) -> Result<(), RelayError> {
        if body.len() > self.max_message_bytes {
            return Err(RelayError::MessageTooLarge {
                size: body.len(),
                limit: self.max_message_bytes,
            });
        }
        self.http
            .post(self.endpoints.publish_url(channel_id))
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn max_message_bytes(&self) -> Option<usize> {
        Some(self.max_message_bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn message_frames_yield_body() {
        let frame = r#"{"id":"x1","time":1,"event":"message","topic":"chan","message":"{\"a\":1}"}"#;
        assert_eq!(message_body(frame).as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(message_body(r#"{"id":"x","event":"open","topic":"chan"}"#).is_none());
        assert!(message_body(r#"{"id":"y","event":"keepalive","topic":"chan"}"#).is_none());
        assert!(message_body("not json").is_none());
    }

    #[test]
    fn rejects_mismatched_schemes() {
        let bad = RelayEndpoints {
            http_url: "wss://relay.example".into(),
            ws_url: "wss://relay.example".into(),
        };
        assert!(matches!(
            NtfyRelay::new(bad),
            Err(RelayError::InvalidEndpoint(_))
        ));

        let bad = RelayEndpoints {
            http_url: "https://relay.example".into(),
            ws_url: "https://relay.example".into(),
        };
        assert!(matches!(
            NtfyRelay::new(bad),
            Err(RelayError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn default_endpoints_are_accepted() {
        let relay = NtfyRelay::new(RelayEndpoints::default()).unwrap();
        assert_eq!(relay.endpoints().http_url, "https://ntfy.sh");
        assert_eq!(relay.max_message_bytes(), Some(DEFAULT_MAX_MESSAGE_BYTES));
    }

    #[tokio::test]
    async fn oversized_body_is_refused_before_sending() {
        // Nothing listens on this port; an attempted request would fail differently.
        let relay = NtfyRelay::new(RelayEndpoints {
            http_url: "http://127.0.0.1:9".into(),
            ws_url: "ws://127.0.0.1:9".into(),
        })
        .unwrap()
        .with_max_message_bytes(16);

        let result = relay.publish("chan", "x".repeat(17)).await;
        assert!(matches!(
            result,
            Err(RelayError::MessageTooLarge { size: 17, limit: 16 })
        ));
    }
}
