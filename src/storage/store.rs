//! Table of buffers addressed by storage id

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::buffer::Buffer;
use crate::error::{Error, ResourceKind, Result};

/// Buffers held by a player, keyed by a generated UUID string
#[derive(Debug, Default)]
pub struct StorageTable {
    buffers: Mutex<HashMap<String, Arc<Buffer>>>,
}

/// Result of resolving an optional storage id
#[derive(Debug, Clone)]
pub struct ResolvedStorage {
    pub id: String,
    pub buffer: Arc<Buffer>,
    /// True when the buffer was allocated by this call
    pub created: bool,
}

impl StorageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new buffer under a fresh id
    pub fn create(&self) -> (String, Arc<Buffer>) {
        let id = Uuid::new_v4().to_string();
        let buffer = Arc::new(Buffer::new());
        self.buffers.lock().insert(id.clone(), buffer.clone());
        debug!("Storage {} created", id);
        (id, buffer)
    }

    /// Reuse the buffer for `id` when it is known, otherwise allocate a new one.
    ///
    /// An unknown id is not an error: a fresh id is generated, never the
    /// caller's.
    pub fn resolve(&self, id: Option<&str>) -> ResolvedStorage {
        if let Some(id) = id {
            if let Some(buffer) = self.buffers.lock().get(id) {
                return ResolvedStorage {
                    id: id.to_string(),
                    buffer: buffer.clone(),
                    created: false,
                };
            }
            debug!("Storage {} unknown, allocating a new one", id);
        }

        let (id, buffer) = self.create();
        ResolvedStorage {
            id,
            buffer,
            created: true,
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<Buffer>> {
        self.buffers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Storage, id))
    }

    /// Remove the buffer and close it so stream consumers terminate
    pub fn remove(&self, id: &str) -> Result<()> {
        let buffer = self
            .buffers
            .lock()
            .remove(id)
            .ok_or_else(|| Error::not_found(ResourceKind::Storage, id))?;
        buffer.close();
        debug!("Storage {} cleared", id);
        Ok(())
    }

    /// Sorted list of known storage ids
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.buffers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.lock().is_empty()
    }
}
