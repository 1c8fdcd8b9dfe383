//! Player node
//!
//! Receives audio from the network into buffers and plays buffers on local
//! output devices.

mod client;
mod service;

pub use client::{LocalPlayer, PlayerControl, RemotePlayer};
pub use service::PlayerService;
