//! Collaborator interfaces for the sync engine.
//!
//! - [`ChainReader`]: read-only chain access (payg-node implements over JSON-RPC)
//! - [`ChannelIndex`]: authoritative live-channel view (payg-node implements over GraphQL)
//! - [`NotificationSink`]: downstream lifecycle notifications (payg-sync broadcasts)
//!
//! The record store lives in [`crate::channel_store`].

use async_trait::async_trait;

use crate::error::PaygError;
use crate::types::{Channel, ChannelId, ChannelNotification, ChannelSnapshot, ChannelView};

/// Read-only view of the chain and the channel contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// This node's registered indexer address, or `None` if not registered yet.
    async fn own_identity(&self) -> Result<Option<String>, PaygError>;

    /// Current chain head height.
    async fn chain_height(&self) -> Result<u64, PaygError>;

    /// Complete state of a channel as the contract currently sees it.
    ///
    /// Returns `None` if the contract has no such channel.
    async fn channel_state(&self, id: &ChannelId) -> Result<Option<ChannelSnapshot>, PaygError>;
}

/// The authoritative index of live channels.
#[async_trait]
pub trait ChannelIndex: Send + Sync {
    /// Every channel the index considers live (not finalized) for `indexer`.
    async fn live_channels(&self, indexer: &str) -> Result<Vec<ChannelView>, PaygError>;
}

/// Consumer of channel lifecycle notifications.
///
/// Called while the channel's write lock is held, so per-channel emission
/// order matches mutation order. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, channel: &Channel, kind: ChannelNotification);
}
