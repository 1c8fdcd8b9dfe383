//! UDP transport: one datagram per chunk, no framing

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::NetworkError;
use super::transport::{listen_addr, ChunkSink, ChunkSource, Transport};

/// UDP transport with a fixed datagram buffer size
#[derive(Debug, Clone)]
pub struct UdpTransport {
    buffer_size: usize,
}

impl UdpTransport {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Bind to a local address with SO_REUSEADDR enabled
    pub fn bind(addr: SocketAddr) -> Result<UdpSocket, NetworkError> {
        let bind_err = |source| NetworkError::BindFailed {
            addr: addr.to_string(),
            source,
        };

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;

        // Allow quick rebind after a receive session stops
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn receive(
        &self,
        port: &str,
        sink: Arc<dyn ChunkSink>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        let addr = listen_addr(port)?;
        let socket = Self::bind(addr)?;
        info!("UDP receive bound to {}", socket.local_addr()?);

        let buffer_size = self.buffer_size;
        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((len, from)) => {
                            trace!("Received {} bytes from {}", len, from);
                            if let Err(e) = sink.write_chunk(&buf[..len]) {
                                warn!("Sink rejected chunk on {}: {}", addr, e);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("UDP receive on {} failed: {}", addr, e);
                            break;
                        }
                    }
                }
            }
            debug!("UDP receive on {} finished", addr);
        });

        Ok(())
    }

    async fn send(
        &self,
        addr: &str,
        mut source: Box<dyn ChunkSource>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        let destination = tokio::net::lookup_host(addr)
            .await
            .map_err(|_| NetworkError::InvalidAddress(addr.to_string()))?
            .next()
            .ok_or_else(|| NetworkError::InvalidAddress(addr.to_string()))?;

        let local: SocketAddr = if destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = Self::bind(local)?;
        socket
            .connect(destination)
            .await
            .map_err(|source| NetworkError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;
        info!("UDP send to {} started", destination);

        let buffer_size = self.buffer_size;
        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    chunk = source.next_chunk() => chunk,
                };
                let Some(chunk) = chunk else {
                    debug!("UDP send source to {} exhausted", destination);
                    break;
                };
                // Datagrams never exceed the configured buffer size
                for datagram in chunk.chunks(buffer_size) {
                    if let Err(e) = socket.send(datagram).await {
                        warn!("UDP send to {} failed: {}", destination, e);
                        return;
                    }
                }
            }
            debug!("UDP send to {} finished", destination);
        });

        Ok(())
    }
}
