//! Control plane
//!
//! WebSocket request/response endpoints for the node services and the
//! orchestrator, and the client the orchestrator uses to reach remote nodes.

mod client;
mod server;

pub use client::ControlClient;
pub use server::{ControlHandler, ControlServer};
