//! Session bookkeeping shared by node services and the orchestrator

mod table;

pub use table::{Cancel, SessionHandle, SessionTable};
