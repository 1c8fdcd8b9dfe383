//! Crate-level error taxonomy
//!
//! Node services and workflows report one of these. Errors relayed from a
//! remote node keep their wire code so local and remote failures can be
//! matched the same way through [`Error::code`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioError;
use crate::network::NetworkError;

/// Kind of contended resource a session key names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Local receive port
    Port,
    /// Audio device on a node
    Device,
    /// Buffer identified by a storage id
    Storage,
    /// Local send leg, keyed by `host:port`
    Destination,
    /// Remote device ownership, keyed by direction and `device@node`
    RemoteDevice,
    /// Local file read by a workflow
    File,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Port => "port",
            ResourceKind::Device => "device",
            ResourceKind::Storage => "storage",
            ResourceKind::Destination => "destination",
            ResourceKind::RemoteDevice => "remote device",
            ResourceKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Wire-level error code carried by control API replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ResourceBusy,
    ResourceNotFound,
    Transport,
    Decode,
    Device,
    Control,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::ResourceBusy => "resource busy",
            ErrorCode::ResourceNotFound => "resource not found",
            ErrorCode::Transport => "transport",
            ErrorCode::Decode => "decode",
            ErrorCode::Device => "device",
            ErrorCode::Control => "control",
        };
        f.write_str(name)
    }
}

/// Errors returned by node services, control clients and workflows
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} {key} is busy")]
    ResourceBusy { kind: ResourceKind, key: String },

    #[error("{kind} {key} not found")]
    ResourceNotFound { kind: ResourceKind, key: String },

    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    #[error("Device error: {0}")]
    Device(#[from] AudioError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Control error: {0}")]
    Control(String),

    #[error("Remote {code}: {message}")]
    Remote { code: ErrorCode, message: String },
}

impl Error {
    pub fn busy(kind: ResourceKind, key: impl Into<String>) -> Self {
        Error::ResourceBusy {
            kind,
            key: key.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, key: impl Into<String>) -> Self {
        Error::ResourceNotFound {
            kind,
            key: key.into(),
        }
    }

    /// Wire code for this error, preserved across the control API
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ResourceBusy { .. } => ErrorCode::ResourceBusy,
            Error::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            Error::Transport(_) => ErrorCode::Transport,
            Error::Device(AudioError::Decode(_)) | Error::Decode(_) => ErrorCode::Decode,
            Error::Device(_) => ErrorCode::Device,
            Error::Control(_) => ErrorCode::Control,
            Error::Remote { code, .. } => *code,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.code() == ErrorCode::ResourceBusy
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::ResourceNotFound
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
