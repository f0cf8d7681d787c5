//! Periodic reconciliation of local channel state against the index.
//!
//! Each tick diffs the locally alive channels against the authoritative
//! index's live set for this node and forces a full resync for every id
//! that is missing on either side or whose fields disagree. This is what
//! repairs events the push path lost.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use payg_core::channel_store::ChannelStore;
use payg_core::error::PaygError;
use payg_core::normalize::{normalize_address, normalize_amount};
use payg_core::traits::{ChainReader, ChannelIndex};
use payg_core::types::{Channel, ChannelId, ChannelView};

use crate::coordinator::SyncCoordinator;
use crate::latch::SweepLatch;

/// Result of one completed sweep.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Channels the index reported live.
    pub live: usize,
    /// Channels alive in the local store.
    pub local_alive: usize,
    /// Ids whose resync succeeded.
    pub resynced: Vec<ChannelId>,
    /// Ids whose resync failed; retried on the next tick.
    pub failed: Vec<ChannelId>,
}

/// What a tick did.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum SweepOutcome {
    /// Another sweep was still running.
    Skipped,
    /// This node has no registered identity yet.
    NoIdentity,
    Completed(SweepReport),
    /// The tick aborted before diffing (identity, index or store failure).
    Failed(String),
}

/// The single periodic reconciliation task.
pub struct Sweeper {
    coordinator: Arc<SyncCoordinator>,
    chain: Arc<dyn ChainReader>,
    index: Arc<dyn ChannelIndex>,
    store: Arc<dyn ChannelStore>,
    latch: SweepLatch,
    last: Mutex<Option<SweepOutcome>>,
}

impl Sweeper {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        chain: Arc<dyn ChainReader>,
        index: Arc<dyn ChannelIndex>,
        store: Arc<dyn ChannelStore>,
    ) -> Self {
        Self {
            coordinator,
            chain,
            index,
            store,
            latch: SweepLatch::new(),
            last: Mutex::new(None),
        }
    }

    /// Run one sweep unless one is already in flight.
    pub async fn tick(&self) -> SweepOutcome {
        let Some(_guard) = self.latch.try_acquire() else {
            debug!("previous sweep still running, skipping tick");
            return SweepOutcome::Skipped;
        };

        let outcome = match self.reconcile().await {
            Ok(Some(report)) => SweepOutcome::Completed(report),
            Ok(None) => SweepOutcome::NoIdentity,
            Err(e) => {
                warn!(error = %e, "reconciliation sweep failed");
                SweepOutcome::Failed(e.to_string())
            }
        };
        *self.last.lock() = Some(outcome.clone());
        outcome
    }

    /// Outcome of the most recent tick that was not skipped.
    pub fn last_outcome(&self) -> Option<SweepOutcome> {
        self.last.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.latch.is_held()
    }

    /// Drive [`tick`](Self::tick) every `period`.
    ///
    /// Each tick runs in its own task, so a tick that outlives the period
    /// makes the next one observe the latch and skip.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let sweeper = Arc::clone(&self);
                tokio::spawn(async move {
                    sweeper.tick().await;
                });
            }
        })
    }

    /// Diff and correct. `Ok(None)` when this node has no identity.
    async fn reconcile(&self) -> Result<Option<SweepReport>, PaygError> {
        let started_at = Utc::now();

        let Some(identity) = self.chain.own_identity().await? else {
            debug!("indexer identity not resolved, skipping sweep");
            return Ok(None);
        };

        let live = self.index.live_channels(&identity).await?;
        let local = self.store.alive_channels()?;
        debug!(live = live.len(), local_alive = local.len(), "sweep started");

        let mut resynced = Vec::new();
        let mut failed = Vec::new();
        for id in plan_resyncs(&local, &live) {
            info!(channel_id = %id, "channel diverged from index, resyncing");
            match self.coordinator.resync_channel(&id).await {
                Ok(_) => resynced.push(id),
                Err(e) => {
                    warn!(channel_id = %id, error = %e, "resync failed");
                    failed.push(id);
                }
            }
        }

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            live: live.len(),
            local_alive: local.len(),
            resynced,
            failed,
        };
        debug!(
            resynced = report.resynced.len(),
            failed = report.failed.len(),
            "sweep finished"
        );
        Ok(Some(report))
    }
}

/// Whether a local record agrees with the index on every reconciled field.
///
/// Compares `status`, `agent`, and the normalized `total`, `spent` and
/// `price`. A view with malformed values never matches.
pub fn compare_channel(local: &Channel, view: &ChannelView) -> bool {
    let same_amount = |ours: &str, theirs: &str| match (
        normalize_amount(ours),
        normalize_amount(theirs),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    let same_agent = match (normalize_address(&local.agent), normalize_address(&view.agent)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };

    local.status == view.status
        && same_agent
        && same_amount(&local.total, &view.total)
        && same_amount(&local.onchain, &view.spent)
        && same_amount(&local.price, &view.price)
}

/// Ids that need a forced resync, in ascending id order.
///
/// - alive locally but absent from the index
/// - present on both sides but unequal under [`compare_channel`]
/// - live in the index with no local alive counterpart
///
/// Index entries whose id cannot be parsed are skipped.
pub fn plan_resyncs(local: &[Channel], live: &[ChannelView]) -> Vec<ChannelId> {
    let mut views: BTreeMap<ChannelId, &ChannelView> = BTreeMap::new();
    for view in live {
        match ChannelId::parse(&view.id) {
            Ok(id) => {
                views.insert(id, view);
            }
            Err(e) => warn!(raw_id = %view.id, error = %e, "index reported malformed channel id"),
        }
    }

    let mut plan = BTreeSet::new();
    for channel in local {
        match views.remove(&channel.id) {
            Some(view) if compare_channel(channel, view) => {}
            _ => {
                plan.insert(channel.id.clone());
            }
        }
    }
    plan.extend(views.into_keys());
    plan.into_iter().collect()
}
