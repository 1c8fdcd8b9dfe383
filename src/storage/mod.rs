//! Audio storage on a player node
//!
//! Buffers outlive the receive session that fills them and are released only
//! by an explicit clear.

mod buffer;
mod store;

pub use buffer::Buffer;
pub use store::{ResolvedStorage, StorageTable};
