//! Process configuration for the node services and the orchestrator
//!
//! The binary fills these from command-line flags and environment variables;
//! tests build them directly.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default control port of the orchestrator
pub const DEFAULT_ORCHESTRATOR_PORT: u16 = 8080;

/// Default control port of a player node
pub const DEFAULT_PLAYER_PORT: u16 = 8081;

/// Default control port of a recorder node
pub const DEFAULT_RECORDER_PORT: u16 = 8082;

/// Default transport read/datagram buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default deadline for one control call to a remote node
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a TCP sender to reach its receiver
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Data-plane transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Udp,
    #[default]
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => f.write_str("udp"),
            TransportKind::Tcp => f.write_str("tcp"),
        }
    }
}

/// Data-plane transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Receive buffer size; also the maximum UDP datagram size
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Player node configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Control API bind address
    pub control_addr: String,
    pub transport: TransportConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            control_addr: format!("0.0.0.0:{}", DEFAULT_PLAYER_PORT),
            transport: TransportConfig::default(),
        }
    }
}

/// Recorder node configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Control API bind address
    pub control_addr: String,
    pub transport: TransportConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            control_addr: format!("0.0.0.0:{}", DEFAULT_RECORDER_PORT),
            transport: TransportConfig::default(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Control API bind address
    pub control_addr: String,
    /// Address recorders stream to when recording into a local file
    pub advertise_ip: IpAddr,
    /// Control port players listen on
    pub player_control_port: u16,
    /// Control port recorders listen on
    pub recorder_control_port: u16,
    /// Deadline for each control call to a remote node
    pub call_timeout: Duration,
    /// Chunk size used when streaming a decoded file
    pub send_chunk_size: usize,
    pub transport: TransportConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            control_addr: format!("0.0.0.0:{}", DEFAULT_ORCHESTRATOR_PORT),
            advertise_ip: default_advertise_ip(),
            player_control_port: DEFAULT_PLAYER_PORT,
            recorder_control_port: DEFAULT_RECORDER_PORT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            send_chunk_size: DEFAULT_BUFFER_SIZE,
            transport: TransportConfig::default(),
        }
    }
}

/// LAN address of this host, or loopback when none can be found
pub fn default_advertise_ip() -> IpAddr {
    local_ip_address::local_ip().unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// `host:port` in the form the transports and control clients accept
pub fn host_port(host: &str, port: impl fmt::Display) -> String {
    if host.contains(':') && !host.starts_with('[') {
        // Bare IPv6 literal
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.player_control_port, 8081);
        assert_eq!(config.recorder_control_port, 8082);
        assert_eq!(config.transport.kind, TransportKind::Tcp);
        assert_eq!(config.transport.buffer_size, 1024);
    }

    #[test]
    fn test_host_port() {
        assert_eq!(host_port("127.0.0.1", 9000), "127.0.0.1:9000");
        assert_eq!(host_port("::1", "9000"), "[::1]:9000");
        assert_eq!(host_port("player-1", 8081), "player-1:8081");
    }
}
