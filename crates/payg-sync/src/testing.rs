//! In-process doubles for the sync engine's collaborators, plus fixtures.
//!
//! Available to this crate's unit tests and, behind the `testing` feature,
//! to downstream test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use payg_core::error::{ChainError, IndexError, PaygError};
use payg_core::events::{FinalizeEvent, LaborEvent, OpenEvent, TerminateEvent};
use payg_core::traits::{ChainReader, ChannelIndex, NotificationSink};
use payg_core::types::{
    Channel, ChannelId, ChannelNotification, ChannelSnapshot, ChannelStatus, ChannelView,
};

pub const INDEXER: &str = "0xaaaa00000000000000000000000000000000beef";
pub const OTHER_INDEXER: &str = "0xbbbb00000000000000000000000000000000beef";
pub const CONSUMER: &str = "0xcccc00000000000000000000000000000000beef";
pub const DELEGATE: &str = "0xdddd00000000000000000000000000000000beef";
pub const DEPLOYMENT: &str = "QmDeployment";
pub const EXPIRY: u64 = 1_700_000_000;
pub const TERMINATED_AT: u64 = 1_750_000_000;

// ----------------------------------------------------------------------------
// Chain
// ----------------------------------------------------------------------------

/// Scriptable [`ChainReader`].
#[derive(Default)]
pub struct MockChain {
    identity: Mutex<Option<String>>,
    height: AtomicU64,
    states: Mutex<HashMap<ChannelId, ChannelSnapshot>>,
    state_reads: AtomicUsize,
    fail_states: AtomicBool,
    delay: Mutex<Option<Duration>>,
    identity_delay: Mutex<Option<Duration>>,
}

impl MockChain {
    /// A chain on which `indexer` is this node's registered identity.
    pub fn registered(indexer: &str) -> Self {
        let chain = Self::default();
        chain.set_identity(Some(indexer));
        chain
    }

    pub fn set_identity(&self, identity: Option<&str>) {
        *self.identity.lock() = identity.map(str::to_string);
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Install or replace the on-chain state of one channel.
    pub fn set_state(&self, snapshot: ChannelSnapshot) {
        self.states.lock().insert(snapshot.id.clone(), snapshot);
    }

    /// Answer reads for `id` with `snapshot`, whatever id it carries.
    pub fn set_state_for(&self, id: &ChannelId, snapshot: ChannelSnapshot) {
        self.states.lock().insert(id.clone(), snapshot);
    }

    pub fn remove_state(&self, id: &ChannelId) {
        self.states.lock().remove(id);
    }

    /// Make every `channel_state` call fail with a transport error.
    pub fn fail_states(&self, fail: bool) {
        self.fail_states.store(fail, Ordering::SeqCst);
    }

    /// Delay every `channel_state` call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Delay every `own_identity` call.
    pub fn set_identity_delay(&self, delay: Option<Duration>) {
        *self.identity_delay.lock() = delay;
    }

    /// Number of `channel_state` calls made so far.
    pub fn state_reads(&self) -> usize {
        self.state_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn own_identity(&self) -> Result<Option<String>, PaygError> {
        let delay = *self.identity_delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.identity.lock().clone())
    }

    async fn chain_height(&self) -> Result<u64, PaygError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn channel_state(&self, id: &ChannelId) -> Result<Option<ChannelSnapshot>, PaygError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_states.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("mock chain unavailable".into()).into());
        }
        Ok(self.states.lock().get(id).cloned())
    }
}

// ----------------------------------------------------------------------------
// Index
// ----------------------------------------------------------------------------

/// Scriptable [`ChannelIndex`].
#[derive(Default)]
pub struct MockIndex {
    live: Mutex<Vec<ChannelView>>,
    fail: AtomicBool,
    queries: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockIndex {
    pub fn set_live(&self, views: Vec<ChannelView>) {
        *self.live.lock() = views;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelIndex for MockIndex {
    async fn live_channels(&self, _indexer: &str) -> Result<Vec<ChannelView>, PaygError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(IndexError::Transport("mock index unavailable".into()).into());
        }
        Ok(self.live.lock().clone())
    }
}

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

/// [`NotificationSink`] that records every emission.
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<(ChannelId, ChannelStatus, ChannelNotification)>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<ChannelNotification> {
        self.seen.lock().iter().map(|(_, _, k)| *k).collect()
    }

    /// Notifications emitted for one channel, in order.
    pub fn for_channel(&self, id: &ChannelId) -> Vec<(ChannelStatus, ChannelNotification)> {
        self.seen
            .lock()
            .iter()
            .filter(|(cid, _, _)| cid == id)
            .map(|(_, s, k)| (*s, *k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, channel: &Channel, kind: ChannelNotification) {
        self.seen
            .lock()
            .push((channel.id.clone(), channel.status, kind));
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

/// ABI-encode `address` as a single 32-byte word.
pub fn encode_delegate(address: &str) -> Vec<u8> {
    let mut word = vec![0u8; 12];
    word.extend(hex::decode(address.trim_start_matches("0x")).unwrap_or_default());
    word
}

/// An open event for this node: total 1000, price 10.
pub fn open_event(id: &str, callback: &[u8]) -> OpenEvent {
    OpenEvent {
        channel_id: id.to_string(),
        indexer: INDEXER.to_string(),
        consumer: CONSUMER.to_string(),
        total: "1000".to_string(),
        price: "10".to_string(),
        expired_at: EXPIRY,
        deployment_id: DEPLOYMENT.to_string(),
        callback: callback.to_vec(),
    }
}

pub fn terminate_event(id: &str, spent: &str, by_indexer: bool) -> TerminateEvent {
    TerminateEvent {
        channel_id: id.to_string(),
        spent: spent.to_string(),
        terminated_at: TERMINATED_AT,
        terminate_by_indexer: by_indexer,
    }
}

pub fn finalize_event(id: &str, total: &str, remain: &str) -> FinalizeEvent {
    FinalizeEvent {
        channel_id: id.to_string(),
        total: total.to_string(),
        remain: remain.to_string(),
    }
}

pub fn labor_event(deployment_id: &str, amount: &str) -> LaborEvent {
    LaborEvent {
        deployment_id: deployment_id.to_string(),
        indexer: INDEXER.to_string(),
        amount: amount.to_string(),
    }
}

/// On-chain state matching what [`open_event`] produces, with `status` and
/// `total` overridden.
pub fn snapshot(id: &str, status: ChannelStatus, total: &str) -> ChannelSnapshot {
    ChannelSnapshot {
        id: ChannelId::parse(id).unwrap_or_else(|e| panic!("fixture id {id}: {e}")),
        status,
        indexer: INDEXER.to_string(),
        consumer: CONSUMER.to_string(),
        agent: CONSUMER.to_string(),
        deployment_id: DEPLOYMENT.to_string(),
        total: total.to_string(),
        spent: "0".to_string(),
        price: "10".to_string(),
        expired_at: EXPIRY,
        terminated_at: EXPIRY,
        terminate_by_indexer: false,
    }
}

/// The index's view of a channel.
pub fn view(id: &str, status: ChannelStatus, total: &str, spent: &str) -> ChannelView {
    ChannelView {
        id: id.to_string(),
        status,
        agent: CONSUMER.to_string(),
        total: total.to_string(),
        spent: spent.to_string(),
        price: "10".to_string(),
    }
}
