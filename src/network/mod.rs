//! Network module
//!
//! Data-plane transports (UDP, TCP) that move opaque audio bytes between
//! legs of a session.

mod error;
mod tcp;
mod transport;
mod udp;

pub use error::NetworkError;
pub use tcp::TcpTransport;
pub use transport::{
    listen_addr, transport_for, ChannelSource, ChunkSink, ChunkSource, MemorySource, Transport,
};
pub use udp::UdpTransport;
