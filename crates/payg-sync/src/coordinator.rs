//! Per-channel state mutation.
//!
//! [`SyncCoordinator`] exposes one entry point per contract event plus
//! [`SyncCoordinator::resync_channel`], which replaces the local record with
//! the authoritative on-chain snapshot. Every channel write goes through the
//! per-id lock in [`ChannelLocks`] and is followed, under the same lock, by
//! the notification for that write.
//!
//! Incremental handlers are idempotent: re-delivering an event leaves the
//! record unchanged and emits nothing. Events for channels that are not in
//! the store are dropped; the reconciliation sweep restores them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use payg_core::channel_store::ChannelStore;
use payg_core::error::{ChainError, PaygError};
use payg_core::events::{
    ChannelEvent, CheckpointEvent, ExtendEvent, FinalizeEvent, FundEvent, LaborEvent, OpenEvent,
    TerminateEvent,
};
use payg_core::normalize::{decode_delegate, normalize_address, normalize_amount, settled_amount};
use payg_core::traits::{ChainReader, NotificationSink};
use payg_core::types::{Channel, ChannelId, ChannelLabor, ChannelNotification, ChannelStatus};

use crate::locks::ChannelLocks;

/// What applying an event or resync did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new channel record was written.
    Created,
    /// An existing record was modified.
    Updated,
    /// The write would not change the record (re-delivery, or the channel is
    /// past the point where this event applies).
    Unchanged,
    /// The channel is not known locally (or not on-chain, for a resync).
    NotFound,
    /// The open event belongs to another indexer, or ours is unknown.
    NotForThisNode,
    /// A labor row was appended with this sequence number.
    LaborRecorded(u64),
}

/// Applies contract events and full resyncs to the channel store.
pub struct SyncCoordinator {
    store: Arc<dyn ChannelStore>,
    chain: Arc<dyn ChainReader>,
    sink: Arc<dyn NotificationSink>,
    locks: ChannelLocks,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn ChannelStore>,
        chain: Arc<dyn ChainReader>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            chain,
            sink,
            locks: ChannelLocks::new(),
        }
    }

    /// Dispatch a decoded contract event to its handler.
    pub async fn apply(&self, event: &ChannelEvent) -> Result<ApplyOutcome, PaygError> {
        match event {
            ChannelEvent::Open(e) => self.on_open(e).await,
            ChannelEvent::Extend(e) => self.on_extend(e).await,
            ChannelEvent::Fund(e) => self.on_fund(e).await,
            ChannelEvent::Checkpoint(e) => self.on_checkpoint(e).await,
            ChannelEvent::Terminate(e) => self.on_terminate(e).await,
            ChannelEvent::Finalize(e) => self.on_finalize(e).await,
            ChannelEvent::Labor(e) => self.on_labor(e).await,
        }
    }

    /// Create the local record for a channel opened with this node.
    pub async fn on_open(&self, event: &OpenEvent) -> Result<ApplyOutcome, PaygError> {
        let Some(own) = self.chain.own_identity().await? else {
            debug!(channel_id = %event.channel_id, "indexer identity unknown, skipping channel open");
            return Ok(ApplyOutcome::NotForThisNode);
        };
        let indexer = normalize_address(&event.indexer)?;
        if normalize_address(&own)? != indexer {
            return Ok(ApplyOutcome::NotForThisNode);
        }

        let id = ChannelId::parse(&event.channel_id)?;
        let consumer = normalize_address(&event.consumer)?;
        let agent = match decode_delegate(&event.callback) {
            Some(delegate) => delegate,
            None => {
                debug!(channel_id = %id, %consumer, "channel created by consumer");
                consumer.clone()
            }
        };
        let channel = Channel {
            id: id.clone(),
            status: ChannelStatus::Open,
            indexer,
            consumer,
            agent,
            deployment_id: event.deployment_id.clone(),
            total: normalize_amount(&event.total)?,
            onchain: "0".to_string(),
            price: normalize_amount(&event.price)?,
            expired_at: event.expired_at,
            terminated_at: event.expired_at,
            terminate_by_indexer: false,
            last_final: false,
        };

        let _guard = self.locks.lock(&id).await;
        if self.store.get_channel(&id)?.is_some() {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.store.put_channel(&channel)?;
        info!(channel_id = %id, agent = %channel.agent, "channel opened");
        self.sink.notify(&channel, ChannelNotification::Opened);
        Ok(ApplyOutcome::Created)
    }

    /// Push out the expiry; the termination deadline moves with it.
    pub async fn on_extend(&self, event: &ExtendEvent) -> Result<ApplyOutcome, PaygError> {
        let id = ChannelId::parse(&event.channel_id)?;
        let expired_at = event.expired_at;
        self.mutate(&id, ChannelNotification::State, |c| {
            if c.last_final {
                return;
            }
            c.expired_at = expired_at;
            c.terminated_at = expired_at;
        })
        .await
    }

    /// Record the new cumulative deposit.
    pub async fn on_fund(&self, event: &FundEvent) -> Result<ApplyOutcome, PaygError> {
        let id = ChannelId::parse(&event.channel_id)?;
        let total = normalize_amount(&event.total)?;
        self.mutate(&id, ChannelNotification::State, |c| {
            if !c.last_final {
                c.total = total;
            }
        })
        .await
    }

    /// Record the checkpointed spent amount.
    pub async fn on_checkpoint(&self, event: &CheckpointEvent) -> Result<ApplyOutcome, PaygError> {
        let id = ChannelId::parse(&event.channel_id)?;
        let spent = normalize_amount(&event.spent)?;
        self.mutate(&id, ChannelNotification::State, |c| {
            if !c.last_final {
                c.onchain = spent;
            }
        })
        .await
    }

    /// Move an open channel into `Terminating`.
    pub async fn on_terminate(&self, event: &TerminateEvent) -> Result<ApplyOutcome, PaygError> {
        let id = ChannelId::parse(&event.channel_id)?;
        let spent = normalize_amount(&event.spent)?;
        self.mutate(&id, ChannelNotification::State, |c| {
            if c.status != ChannelStatus::Open {
                return;
            }
            c.onchain = spent;
            c.status = ChannelStatus::Terminating;
            c.terminated_at = event.terminated_at;
            c.terminate_by_indexer = event.terminate_by_indexer;
            c.last_final = true;
        })
        .await
    }

    /// Settle a channel: `onchain = total - remain`, status `Finalized`.
    pub async fn on_finalize(&self, event: &FinalizeEvent) -> Result<ApplyOutcome, PaygError> {
        let id = ChannelId::parse(&event.channel_id)?;
        let settled = settled_amount(&event.total, &event.remain)?;
        self.mutate(&id, ChannelNotification::Stopped, |c| {
            if c.status == ChannelStatus::Finalized {
                return;
            }
            c.onchain = settled;
            c.status = ChannelStatus::Finalized;
            c.last_final = true;
        })
        .await
    }

    /// Append a labor row stamped with the current chain height.
    pub async fn on_labor(&self, event: &LaborEvent) -> Result<ApplyOutcome, PaygError> {
        let created_at = self.chain.chain_height().await?;
        let labor = ChannelLabor {
            deployment_id: event.deployment_id.clone(),
            indexer: normalize_address(&event.indexer)?,
            total: normalize_amount(&event.amount)?,
            created_at,
        };
        let seq = self.store.append_labor(&labor)?;
        debug!(deployment_id = %labor.deployment_id, created_at, seq, "labor recorded");
        Ok(ApplyOutcome::LaborRecorded(seq))
    }

    /// Replace the local record with the contract's current state.
    ///
    /// Creates the record if it is missing locally. The chain is read while
    /// the channel lock is held, so a resync always reflects state at least
    /// as new as any incremental write that completed before it. A snapshot
    /// whose status is behind the local one is treated as stale and ignored.
    pub async fn resync_channel(&self, id: &ChannelId) -> Result<ApplyOutcome, PaygError> {
        let _guard = self.locks.lock(id).await;

        let Some(snapshot) = self.chain.channel_state(id).await? else {
            debug!(channel_id = %id, "channel not found on chain, nothing to resync");
            return Ok(ApplyOutcome::NotFound);
        };
        let snapshot = snapshot.normalized()?;
        if snapshot.id != *id {
            return Err(ChainError::Malformed(format!(
                "requested channel {id}, chain returned {}",
                snapshot.id
            ))
            .into());
        }

        let (channel, outcome) = match self.store.get_channel(id)? {
            Some(local) => {
                if !local.status.can_become(snapshot.status) {
                    warn!(
                        channel_id = %id,
                        local = %local.status,
                        chain = %snapshot.status,
                        "ignoring stale chain snapshot"
                    );
                    return Ok(ApplyOutcome::Unchanged);
                }
                let mut next = local.clone();
                next.apply_snapshot(&snapshot);
                if next == local {
                    return Ok(ApplyOutcome::Unchanged);
                }
                (next, ApplyOutcome::Updated)
            }
            None => (Channel::from_snapshot(&snapshot), ApplyOutcome::Created),
        };

        self.store.put_channel(&channel)?;
        info!(channel_id = %id, status = %channel.status, "channel resynced from chain");
        self.sink.notify(&channel, notification_for(&channel));
        Ok(outcome)
    }

    /// Read-modify-write an existing channel under its lock.
    ///
    /// `update` may leave the record untouched to signal that the event does
    /// not apply; nothing is written or emitted in that case.
    async fn mutate<F>(
        &self,
        id: &ChannelId,
        kind: ChannelNotification,
        update: F,
    ) -> Result<ApplyOutcome, PaygError>
    where
        F: FnOnce(&mut Channel),
    {
        let _guard = self.locks.lock(id).await;

        let Some(current) = self.store.get_channel(id)? else {
            debug!(channel_id = %id, "channel not found locally, dropping event");
            return Ok(ApplyOutcome::NotFound);
        };

        let mut next = current.clone();
        update(&mut next);
        if next == current {
            return Ok(ApplyOutcome::Unchanged);
        }

        self.store.put_channel(&next)?;
        debug!(channel_id = %id, status = %next.status, ?kind, "channel updated");
        self.sink.notify(&next, kind);
        Ok(ApplyOutcome::Updated)
    }
}

fn notification_for(channel: &Channel) -> ChannelNotification {
    if channel.status == ChannelStatus::Finalized {
        ChannelNotification::Stopped
    } else {
        ChannelNotification::State
    }
}
