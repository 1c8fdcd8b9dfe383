//! Recorder node
//!
//! Captures local input devices and streams them to a network destination.

mod client;
mod service;

pub use client::{LocalRecorder, RecorderControl, RemoteRecorder};
pub use service::RecorderService;
