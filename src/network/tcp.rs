//! TCP transport: continuous byte stream with connection backpressure

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::NetworkError;
use crate::config::DEFAULT_CONNECT_TIMEOUT;
use super::transport::{listen_addr, ChunkSink, ChunkSource, Transport};

/// TCP transport; the receiver accepts senders one after another
#[derive(Debug, Clone)]
pub struct TcpTransport {
    buffer_size: usize,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound how long `send` waits for the connection to be accepted
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn listen(port: &str) -> Result<TcpListener, NetworkError> {
        let addr = listen_addr(port)?;
        let bind_err = |source| NetworkError::BindFailed {
            addr: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        socket.listen(16).map_err(bind_err)
    }
}

/// Pump one accepted connection into the sink.
///
/// Returns false when the receive session should end.
async fn pump_connection(
    mut stream: TcpStream,
    sink: &Arc<dyn ChunkSink>,
    buffer_size: usize,
    token: &CancellationToken,
) -> bool {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            _ = token.cancelled() => return false,
            result = stream.read(&mut buf) => match result {
                Ok(0) => return true,
                Ok(len) => {
                    if let Err(e) = sink.write_chunk(&buf[..len]) {
                        warn!("Sink rejected chunk: {}", e);
                        return false;
                    }
                }
                Err(e) => {
                    warn!("TCP read failed: {}", e);
                    return true;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn receive(
        &self,
        port: &str,
        sink: Arc<dyn ChunkSink>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        let listener = Self::listen(port)?;
        let local_addr = listener.local_addr()?;
        info!("TCP receive listening on {}", local_addr);

        let buffer_size = self.buffer_size;
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("TCP sender {} connected to {}", peer, local_addr);
                        if !pump_connection(stream, &sink, buffer_size, &token).await {
                            break;
                        }
                        debug!("TCP sender {} disconnected", peer);
                    }
                    Err(e) => {
                        warn!("TCP accept on {} failed: {}", local_addr, e);
                        break;
                    }
                }
            }
            debug!("TCP receive on {} finished", local_addr);
        });

        Ok(())
    }

    async fn send(
        &self,
        addr: &str,
        mut source: Box<dyn ChunkSource>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        // Callers hold a session table lock while this runs
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Timeout(addr.to_string()))?
            .map_err(|source| NetworkError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!("TCP send to {} started", addr);

        let destination = addr.to_string();
        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    chunk = source.next_chunk() => chunk,
                };
                let Some(chunk) = chunk else {
                    debug!("TCP send source to {} exhausted", destination);
                    break;
                };
                let written = tokio::select! {
                    _ = token.cancelled() => break,
                    written = stream.write_all(&chunk) => written,
                };
                if let Err(e) = written {
                    warn!("TCP send to {} failed: {}", destination, e);
                    return;
                }
            }
            let _ = stream.shutdown().await;
            debug!("TCP send to {} finished", destination);
        });

        Ok(())
    }
}
