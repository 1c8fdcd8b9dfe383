//! WebSocket control endpoint
//!
//! Each text message is one request envelope; the handler's answer is sent
//! back as a reply carrying the same id. Requests on one connection are
//! handled in order.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::network::NetworkError;
use crate::protocol::{ControlResult, RemoteError, Reply};

/// Service behind a control endpoint
#[async_trait]
pub trait ControlHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response>;
}

/// Control endpoint bound to a local address
pub struct ControlServer<H> {
    listener: TcpListener,
    handler: Arc<H>,
}

impl<H: ControlHandler> ControlServer<H> {
    pub async fn bind(addr: &str, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(NetworkError::from)?)
    }

    /// Accept connections until `token` is cancelled
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let local_addr = self.local_addr()?;
        info!("Control server listening on {}", local_addr);

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New control connection from {}", peer_addr);
                    let handler = self.handler.clone();
                    let token = token.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, token).await {
                            warn!("Control connection {} error: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }

        info!("Control server on {} stopped", local_addr);
        Ok(())
    }
}

async fn handle_connection<H: ControlHandler>(
    stream: TcpStream,
    handler: Arc<H>,
    token: CancellationToken,
) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| NetworkError::Control(format!("WebSocket accept failed: {}", e)))?;
    let (mut write, mut read) = ws_stream.split();

    loop {
        let msg = tokio::select! {
            _ = token.cancelled() => break,
            msg = read.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                let json = dispatch(handler.as_ref(), &text).await;
                write
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| NetworkError::Control(format!("Send failed: {}", e)))?;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Decode one request, run it, and encode the reply
async fn dispatch<H: ControlHandler>(handler: &H, text: &str) -> String {
    let (id, result) = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(mut value) => {
            let id = value.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
            let body = value
                .get_mut("body")
                .map(serde_json::Value::take)
                .unwrap_or_default();
            match serde_json::from_value::<H::Request>(body) {
                Ok(request) => (id, handler.handle(request).await),
                Err(e) => (id, Err(Error::Control(format!("Invalid request: {}", e)))),
            }
        }
        Err(e) => (0, Err(Error::Control(format!("Invalid message: {}", e)))),
    };

    if let Err(e) = &result {
        debug!("Request {} failed: {}", id, e);
    }

    let reply = Reply {
        id,
        result: ControlResult::from(result),
    };
    serde_json::to_string(&reply).unwrap_or_else(|e| {
        // Response types are plain data; this only trips on a broken Serialize impl
        let fallback: Reply<()> = Reply {
            id,
            result: ControlResult::Err(RemoteError {
                code: crate::error::ErrorCode::Control,
                message: format!("Serialize failed: {}", e),
            }),
        };
        serde_json::to_string(&fallback).unwrap_or_default()
    })
}
