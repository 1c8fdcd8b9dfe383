//! audiorelay - Networked audio distribution between player and recorder nodes
//!
//! A player node receives audio over the network into buffers and plays them
//! on local devices; a recorder node captures devices and streams them out.
//! The orchestrator drives both through their control APIs and composes
//! file playback, file recording and recorder-to-player bridging.

pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod player;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use player::PlayerService;
pub use recorder::RecorderService;
pub use storage::Buffer;
