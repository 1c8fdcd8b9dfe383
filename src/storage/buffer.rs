//! FIFO byte queue used as the hand-off between a network leg and a device leg
//!
//! Chunk boundaries are preserved: every `write` becomes exactly one chunk
//! returned by one `read`. The queue is unbounded; a slow consumer grows it
//! without limit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unbounded FIFO of byte chunks
#[derive(Debug, Default)]
pub struct Buffer {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: AtomicBool,
    bytes_written: AtomicU64,
}

impl Buffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of `chunk` to the back. Never blocks.
    pub fn write(&self, chunk: &[u8]) {
        self.chunks.lock().push_back(chunk.to_vec());
        self.bytes_written
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Remove and return the front chunk, or `None` if nothing has arrived yet
    pub fn read(&self) -> Option<Vec<u8>> {
        self.chunks.lock().pop_front()
    }

    /// Wait for the next chunk.
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub async fn next(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.notify.notified();
            if let Some(chunk) = self.read() {
                return Some(chunk);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Mark the end of the stream and wake any waiting consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        // A consumer between its empty check and `notified().await` has not
        // registered yet; leave a permit for it.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of queued chunks
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Total bytes ever written
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
