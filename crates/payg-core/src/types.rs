//! Channel ledger types: channel records, labor rows and external views.
//!
//! All monetary values are non-negative integers held as canonical decimal
//! strings (see [`crate::normalize`]); addresses are lowercase `0x` hex.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::normalize::{canonical_id, normalize_address, normalize_amount};

/// Canonical decimal identifier of an on-chain payment channel.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Parse an id from decimal or `0x` hex and store its canonical form.
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        canonical_id(raw).map(Self)
    }

    /// The canonical decimal string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a channel.
///
/// Transitions are monotonic: `Open -> Terminating -> Finalized`. A channel
/// may skip `Terminating` if that event was never observed.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Open,
    Terminating,
    Finalized,
}

impl ChannelStatus {
    /// Position in the lifecycle; higher is later.
    pub fn rank(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Terminating => 1,
            Self::Finalized => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_become(self, next: Self) -> bool {
        next.rank() >= self.rank()
    }

    /// Whether the channel is still considered alive locally.
    pub fn is_alive(self) -> bool {
        self != Self::Finalized
    }

    /// Parse the index/gateway spelling (`OPEN`, `TERMINATING`, `FINALIZED`).
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "TERMINATING" => Ok(Self::Terminating),
            "FINALIZED" => Ok(Self::Finalized),
            _ => Err(ChannelError::UnknownStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Terminating => "TERMINATING",
            Self::Finalized => "FINALIZED",
        };
        f.write_str(s)
    }
}

/// Local record of one payment channel.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Canonical channel id. Immutable.
    pub id: ChannelId,
    pub status: ChannelStatus,
    /// Service provider the channel is scoped to. Immutable.
    pub indexer: String,
    /// Payer address. Immutable.
    pub consumer: String,
    /// Address allowed to spend on the consumer's behalf.
    pub agent: String,
    pub deployment_id: String,
    /// Cumulative deposit.
    pub total: String,
    /// Amount the contract recognizes as settled (the on-chain `spent`).
    pub onchain: String,
    pub price: String,
    pub expired_at: u64,
    pub terminated_at: u64,
    pub terminate_by_indexer: bool,
    /// No further state transitions are expected once set.
    pub last_final: bool,
}

impl Channel {
    /// Build the record for a channel whose authoritative state is `snapshot`.
    pub fn from_snapshot(snapshot: &ChannelSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            status: snapshot.status,
            indexer: snapshot.indexer.clone(),
            consumer: snapshot.consumer.clone(),
            agent: snapshot.agent.clone(),
            deployment_id: snapshot.deployment_id.clone(),
            total: snapshot.total.clone(),
            onchain: snapshot.spent.clone(),
            price: snapshot.price.clone(),
            expired_at: snapshot.expired_at,
            terminated_at: snapshot.terminated_at,
            terminate_by_indexer: snapshot.terminate_by_indexer,
            last_final: snapshot.status != ChannelStatus::Open,
        }
    }

    /// Overwrite every mutable field with the authoritative `snapshot`.
    ///
    /// `consumer` and `indexer` are kept from the existing record.
    pub fn apply_snapshot(&mut self, snapshot: &ChannelSnapshot) {
        self.status = snapshot.status;
        self.agent = snapshot.agent.clone();
        self.deployment_id = snapshot.deployment_id.clone();
        self.total = snapshot.total.clone();
        self.onchain = snapshot.spent.clone();
        self.price = snapshot.price.clone();
        self.expired_at = snapshot.expired_at;
        self.terminated_at = snapshot.terminated_at;
        self.terminate_by_indexer = snapshot.terminate_by_indexer;
        self.last_final = self.last_final || snapshot.status != ChannelStatus::Open;
    }
}

/// Append-only usage observation for a deployment served by an indexer.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub struct ChannelLabor {
    pub deployment_id: String,
    pub indexer: String,
    /// Reported usage amount.
    pub total: String,
    /// Chain height at observation time.
    pub created_at: u64,
}

/// Complete point-in-time channel state read from the chain.
///
/// Every field is required: a resync overwrites the local record wholesale,
/// so a missing field must fail decoding rather than default.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub status: ChannelStatus,
    pub indexer: String,
    pub consumer: String,
    pub agent: String,
    pub deployment_id: String,
    pub total: String,
    pub spent: String,
    pub price: String,
    pub expired_at: u64,
    pub terminated_at: u64,
    pub terminate_by_indexer: bool,
}

impl ChannelSnapshot {
    /// Normalize ids, addresses and amounts to canonical form.
    pub fn normalized(mut self) -> Result<Self, ChannelError> {
        self.id = ChannelId::parse(self.id.as_str())?;
        self.indexer = normalize_address(&self.indexer)?;
        self.consumer = normalize_address(&self.consumer)?;
        self.agent = normalize_address(&self.agent)?;
        self.total = normalize_amount(&self.total)?;
        self.spent = normalize_amount(&self.spent)?;
        self.price = normalize_amount(&self.price)?;
        Ok(self)
    }
}

/// The fields of a live channel as reported by the authoritative index.
///
/// `id` is kept raw (the index may report hex); it is normalized by the
/// reconciliation sweep before comparison.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChannelView {
    pub id: String,
    pub status: ChannelStatus,
    pub agent: String,
    pub total: String,
    pub spent: String,
    pub price: String,
}

impl From<&Channel> for ChannelView {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id.to_string(),
            status: channel.status,
            agent: channel.agent.clone(),
            total: channel.total.clone(),
            spent: channel.onchain.clone(),
            price: channel.price.clone(),
        }
    }
}

/// Kind of lifecycle notification emitted after a channel mutation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelNotification {
    Opened,
    State,
    Stopped,
}
