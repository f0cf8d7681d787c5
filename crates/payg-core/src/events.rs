//! Channel contract lifecycle events.
//!
//! The chain gateway delivers one [`ChannelEvent`] per contract log, already
//! decoded from the ABI. Numeric fields arrive as strings (decimal or `0x`
//! hex) and are normalized when a handler applies them.

use serde::{Deserialize, Serialize};

/// A channel was opened by a consumer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenEvent {
    pub channel_id: String,
    pub indexer: String,
    pub consumer: String,
    pub total: String,
    pub price: String,
    pub expired_at: u64,
    pub deployment_id: String,
    /// Opaque payload; an ABI-encoded delegate address when one was given.
    #[serde(with = "hex_bytes", default)]
    pub callback: Vec<u8>,
}

/// The channel expiry was pushed out.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendEvent {
    pub channel_id: String,
    pub expired_at: u64,
}

/// The consumer deposited more funds; `total` is the new cumulative deposit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FundEvent {
    pub channel_id: String,
    pub total: String,
}

/// A spent amount was checkpointed on-chain.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEvent {
    pub channel_id: String,
    pub spent: String,
}

/// Termination was requested by one of the parties.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TerminateEvent {
    pub channel_id: String,
    pub spent: String,
    pub terminated_at: u64,
    pub terminate_by_indexer: bool,
}

/// The channel was settled; `remain` was refunded out of `total`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeEvent {
    pub channel_id: String,
    pub total: String,
    pub remain: String,
}

/// Usage reported for a deployment served by an indexer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaborEvent {
    pub deployment_id: String,
    pub indexer: String,
    pub amount: String,
}

/// One decoded contract event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ChannelEvent {
    #[serde(rename = "ChannelOpen")]
    Open(OpenEvent),
    #[serde(rename = "ChannelExtend")]
    Extend(ExtendEvent),
    #[serde(rename = "ChannelFund")]
    Fund(FundEvent),
    #[serde(rename = "ChannelCheckpoint")]
    Checkpoint(CheckpointEvent),
    #[serde(rename = "ChannelTerminate")]
    Terminate(TerminateEvent),
    #[serde(rename = "ChannelFinalize")]
    Finalize(FinalizeEvent),
    #[serde(rename = "ChannelLabor")]
    Labor(LaborEvent),
}

impl ChannelEvent {
    /// Contract event name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open(_) => "ChannelOpen",
            Self::Extend(_) => "ChannelExtend",
            Self::Fund(_) => "ChannelFund",
            Self::Checkpoint(_) => "ChannelCheckpoint",
            Self::Terminate(_) => "ChannelTerminate",
            Self::Finalize(_) => "ChannelFinalize",
            Self::Labor(_) => "ChannelLabor",
        }
    }

    /// Raw channel id the event refers to. Labor events carry none.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::Open(e) => Some(&e.channel_id),
            Self::Extend(e) => Some(&e.channel_id),
            Self::Fund(e) => Some(&e.channel_id),
            Self::Checkpoint(e) => Some(&e.channel_id),
            Self::Terminate(e) => Some(&e.channel_id),
            Self::Finalize(e) => Some(&e.channel_id),
            Self::Labor(_) => None,
        }
    }
}

/// An event together with the block it was emitted in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedEvent {
    pub block_number: u64,
    #[serde(default)]
    pub log_index: u64,
    #[serde(flatten)]
    pub event: ChannelEvent,
}

/// `0x`-prefixed hex (de)serialization for byte payloads.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
