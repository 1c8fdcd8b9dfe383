//! Network error types

use thiserror::Error;

/// Errors that can occur in the network subsystem
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Control channel error: {0}")]
    Control(String),

    #[error("Call to {0} timed out")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
