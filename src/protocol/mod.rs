//! Control protocol definitions
//!
//! JSON messages exchanged with player, recorder and orchestrator control
//! endpoints.

mod messages;

pub use messages::{
    ControlResult, Envelope, FilePlayback, OrchestratorRequest, OrchestratorResponse,
    PlayerRequest, PlayerResponse, PlayerState, RecorderRequest, RecorderResponse, RecorderState,
    RemoteError, Reply,
};
