//! Control client for a remote node
//!
//! One WebSocket connection per call: connect, send the envelope, wait for
//! the reply with the matching id, close. The whole exchange is bounded by
//! the client's call timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

use crate::config::host_port;
use crate::error::{Error, Result};
use crate::network::NetworkError;
use crate::protocol::{Envelope, Reply};

/// Client for one control endpoint
#[derive(Debug)]
pub struct ControlClient {
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl ControlClient {
    /// Client for `ws://host:port`
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self::with_url(format!("ws://{}", host_port(host, port)), timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `request` and wait for its reply.
    ///
    /// Error replies come back as [`Error::Remote`] with the remote's code.
    pub async fn call<Req, Resp>(&self, request: Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope { id, body: request };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| Error::Control(format!("Serialize failed: {}", e)))?;

        match tokio::time::timeout(self.timeout, self.exchange(id, json)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(self.url.clone()).into()),
        }
    }

    async fn exchange<Resp: DeserializeOwned>(&self, id: u64, json: String) -> Result<Resp> {
        let (mut ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| NetworkError::Control(format!("Connect to {} failed: {}", self.url, e)))?;
        debug!("Connected to control endpoint {}", self.url);

        ws_stream
            .send(Message::Text(json))
            .await
            .map_err(|e| NetworkError::Control(format!("Send failed: {}", e)))?;

        let reply = loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let reply: Reply<Resp> = serde_json::from_str(&text)
                        .map_err(|e| Error::Control(format!("Deserialize failed: {}", e)))?;
                    if reply.id == id {
                        break reply;
                    }
                    trace!("Skipping reply {} while waiting for {}", reply.id, id);
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(NetworkError::ConnectionClosed.into());
                }
                Some(Err(e)) => {
                    return Err(NetworkError::Control(format!("Receive failed: {}", e)).into());
                }
                _ => continue,
            }
        };

        let _ = ws_stream.close(None).await;
        reply.result.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let client = ControlClient::new("10.0.0.5", 8081, Duration::from_secs(1));
        assert_eq!(client.url(), "ws://10.0.0.5:8081");
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ControlClient::new("127.0.0.1", port, Duration::from_secs(2));
        let err = client
            .call::<_, serde_json::Value>(serde_json::json!({"type": "State"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Transport);
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        // Accepts TCP but never completes the WebSocket handshake
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = ControlClient::new("127.0.0.1", port, Duration::from_millis(200));
        let err = client
            .call::<_, serde_json::Value>(serde_json::json!({"type": "State"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(NetworkError::Timeout(_))));
    }
}
