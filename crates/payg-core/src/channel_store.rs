//! Channel store interface and in-memory implementation.
//!
//! Provides the [`ChannelStore`] trait for channel records, the append-only
//! labor ledger, and small pieces of engine metadata. The
//! [`MemoryChannelStore`] is suitable for testing; the production node uses
//! RocksDB (payg-node).
//!
//! The store performs no lifecycle validation. Callers serialize writes for
//! a channel id and enforce status monotonicity before calling
//! [`ChannelStore::put_channel`].

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::PaygError;
use crate::types::{Channel, ChannelId, ChannelLabor};

/// Durable channel table plus labor ledger.
///
/// All methods take `&self`; implementations provide their own interior
/// synchronization so the store can be shared across tasks.
pub trait ChannelStore: Send + Sync {
    /// Look up a channel by id. Returns `None` if unknown.
    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, PaygError>;

    /// Insert or replace a channel record.
    fn put_channel(&self, channel: &Channel) -> Result<(), PaygError>;

    /// Every channel whose status is not `Finalized`.
    fn alive_channels(&self) -> Result<Vec<Channel>, PaygError>;

    /// Number of channel records.
    fn channel_count(&self) -> Result<usize, PaygError>;

    /// Append a labor row and return its sequence number.
    ///
    /// Rows are never merged: identical rows appended twice are stored twice.
    fn append_labor(&self, labor: &ChannelLabor) -> Result<u64, PaygError>;

    /// All labor rows for a deployment, in append order.
    fn labor_for_deployment(&self, deployment_id: &str) -> Result<Vec<ChannelLabor>, PaygError>;

    /// Total number of labor rows.
    fn labor_count(&self) -> Result<u64, PaygError>;

    /// Next block the event feed should be read from, if recorded.
    fn event_cursor(&self) -> Result<Option<u64>, PaygError>;

    /// Record the next block the event feed should be read from.
    fn set_event_cursor(&self, next_block: u64) -> Result<(), PaygError>;
}

#[derive(Default)]
struct MemoryInner {
    /// Channel records by canonical id.
    channels: BTreeMap<ChannelId, Channel>,
    /// Labor rows in append order.
    labor: Vec<ChannelLabor>,
    event_cursor: Option<u64>,
}

/// In-memory channel store for testing.
///
/// No persistence and unbounded growth; not for production use.
#[derive(Default)]
pub struct MemoryChannelStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryChannelStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every channel record, ordered by id.
    pub fn all_channels(&self) -> Vec<Channel> {
        self.inner.read().channels.values().cloned().collect()
    }
}

impl ChannelStore for MemoryChannelStore {
    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, PaygError> {
        Ok(self.inner.read().channels.get(id).cloned())
    }

    fn put_channel(&self, channel: &Channel) -> Result<(), PaygError> {
        self.inner
            .write()
            .channels
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn alive_channels(&self) -> Result<Vec<Channel>, PaygError> {
        Ok(self
            .inner
            .read()
            .channels
            .values()
            .filter(|c| c.status.is_alive())
            .cloned()
            .collect())
    }

    fn channel_count(&self) -> Result<usize, PaygError> {
        Ok(self.inner.read().channels.len())
    }

    fn append_labor(&self, labor: &ChannelLabor) -> Result<u64, PaygError> {
        let mut inner = self.inner.write();
        inner.labor.push(labor.clone());
        Ok(inner.labor.len() as u64 - 1)
    }

    fn labor_for_deployment(&self, deployment_id: &str) -> Result<Vec<ChannelLabor>, PaygError> {
        Ok(self
            .inner
            .read()
            .labor
            .iter()
            .filter(|l| l.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    fn labor_count(&self) -> Result<u64, PaygError> {
        Ok(self.inner.read().labor.len() as u64)
    }

    fn event_cursor(&self) -> Result<Option<u64>, PaygError> {
        Ok(self.inner.read().event_cursor)
    }

    fn set_event_cursor(&self, next_block: u64) -> Result<(), PaygError> {
        self.inner.write().event_cursor = Some(next_block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelStatus;

    fn channel(id: &str, status: ChannelStatus) -> Channel {
        Channel {
            id: ChannelId::parse(id).unwrap(),
            status,
            indexer: format!("0x{}", "11".repeat(20)),
            consumer: format!("0x{}", "22".repeat(20)),
            agent: format!("0x{}", "22".repeat(20)),
            deployment_id: "QmDeployment".into(),
            total: "100".into(),
            onchain: "0".into(),
            price: "1".into(),
            expired_at: 0,
            terminated_at: 0,
            terminate_by_indexer: false,
            last_final: status != ChannelStatus::Open,
        }
    }

    fn labor(deployment: &str, height: u64) -> ChannelLabor {
        ChannelLabor {
            deployment_id: deployment.into(),
            indexer: format!("0x{}", "11".repeat(20)),
            total: "5".into(),
            created_at: height,
        }
    }

    #[test]
    fn put_then_get() {
        let store = MemoryChannelStore::new();
        let c = channel("1", ChannelStatus::Open);
        store.put_channel(&c).unwrap();
        assert_eq!(store.get_channel(&c.id).unwrap(), Some(c));
        assert_eq!(store.channel_count().unwrap(), 1);
    }

    #[test]
    fn get_unknown_is_none() {
        let store = MemoryChannelStore::new();
        let id = ChannelId::parse("9").unwrap();
        assert!(store.get_channel(&id).unwrap().is_none());
    }

    #[test]
    fn put_replaces_existing() {
        let store = MemoryChannelStore::new();
        let mut c = channel("1", ChannelStatus::Open);
        store.put_channel(&c).unwrap();
        c.total = "200".into();
        store.put_channel(&c).unwrap();
        assert_eq!(store.get_channel(&c.id).unwrap().unwrap().total, "200");
        assert_eq!(store.channel_count().unwrap(), 1);
    }

    #[test]
    fn alive_excludes_finalized() {
        let store = MemoryChannelStore::new();
        store.put_channel(&channel("1", ChannelStatus::Open)).unwrap();
        store.put_channel(&channel("2", ChannelStatus::Terminating)).unwrap();
        store.put_channel(&channel("3", ChannelStatus::Finalized)).unwrap();

        let ids: Vec<String> = store
            .alive_channels()
            .unwrap()
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn labor_is_append_only() {
        let store = MemoryChannelStore::new();
        assert_eq!(store.append_labor(&labor("QmA", 10)).unwrap(), 0);
        assert_eq!(store.append_labor(&labor("QmA", 10)).unwrap(), 1);
        assert_eq!(store.append_labor(&labor("QmB", 11)).unwrap(), 2);

        assert_eq!(store.labor_count().unwrap(), 3);
        assert_eq!(store.labor_for_deployment("QmA").unwrap().len(), 2);
        assert_eq!(store.labor_for_deployment("QmC").unwrap().len(), 0);
    }

    #[test]
    fn event_cursor_roundtrip() {
        let store = MemoryChannelStore::new();
        assert_eq!(store.event_cursor().unwrap(), None);
        store.set_event_cursor(128).unwrap();
        assert_eq!(store.event_cursor().unwrap(), Some(128));
    }
}
