//! Per-channel write serialization.
//!
//! Event handlers and sweep-triggered resyncs run concurrently. Every
//! read-modify-write of a channel record, including the notification that
//! follows it, happens while holding that channel's lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use payg_core::types::ChannelId;

/// One async mutex per channel id, created on first use.
///
/// Entries are never removed; the map is bounded by the number of channels
/// this node has ever seen.
#[derive(Default)]
pub struct ChannelLocks {
    locks: DashMap<ChannelId, Arc<Mutex<()>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `id`.
    pub async fn lock(&self, id: &ChannelId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard guard is released before awaiting.
        let mutex = Arc::clone(&*self.locks.entry(id.clone()).or_default());
        mutex.lock_owned().await
    }

    /// Number of channel ids that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
