//! Data-plane transport abstraction
//!
//! A transport moves opaque byte chunks: `receive` binds a local port and
//! appends everything that arrives to a [`ChunkSink`]; `send` connects to a
//! destination and forwards chunks pulled from a [`ChunkSource`]. Both return
//! once the socket is ready and the background task is spawned; the task runs
//! until its cancellation token fires, the source ends, or an I/O error occurs.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::NetworkError;
use super::tcp::TcpTransport;
use super::udp::UdpTransport;
use crate::config::{TransportConfig, TransportKind};
use crate::storage::Buffer;

/// Destination for received chunks
pub trait ChunkSink: Send + Sync {
    fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()>;
}

impl ChunkSink for Buffer {
    fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()> {
        self.write(chunk);
        Ok(())
    }
}

/// Producer of chunks to send. `None` ends the stream.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Byte-stream transport (UDP or TCP)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind `port` and write every received chunk into `sink` until cancelled
    async fn receive(
        &self,
        port: &str,
        sink: Arc<dyn ChunkSink>,
        token: CancellationToken,
    ) -> Result<(), NetworkError>;

    /// Connect to `addr` and forward chunks from `source` until cancelled or exhausted
    async fn send(
        &self,
        addr: &str,
        source: Box<dyn ChunkSource>,
        token: CancellationToken,
    ) -> Result<(), NetworkError>;
}

/// Build the transport selected by configuration
pub fn transport_for(config: &TransportConfig) -> Arc<dyn Transport> {
    match config.kind {
        TransportKind::Udp => Arc::new(UdpTransport::new(config.buffer_size)),
        TransportKind::Tcp => Arc::new(TcpTransport::new(config.buffer_size)),
    }
}

/// Local address to bind for a receive port.
///
/// Accepts `"9000"`, `":9000"` or a full `"ip:port"`.
pub fn listen_addr(port: &str) -> Result<SocketAddr, NetworkError> {
    let trimmed = port.trim_start_matches(':');
    if let Ok(port) = trimmed.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    port.parse()
        .map_err(|_| NetworkError::InvalidAddress(port.to_string()))
}

/// Streams an in-memory payload in fixed-size chunks
pub struct MemorySource {
    data: Vec<u8>,
    chunk_size: usize,
    position: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            position: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.position >= self.data.len() {
            return None;
        }
        let end = (self.position + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Some(chunk)
    }
}

/// Streams chunks delivered over a channel (e.g. from a capture callback)
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
