//! JSON-RPC query and admin surface for the sync node.
//!
//! Uses jsonrpsee 0.24 to expose the local channel ledger, the labor
//! ledger, sync status, and an admin-forced resync.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use payg_core::error::PaygError;
use payg_core::types::{Channel, ChannelId, ChannelLabor};
use payg_sync::ApplyOutcome;

use crate::node::{Node, SyncStatus};

/// Result of an admin-forced resync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResultJson {
    /// Canonical channel id.
    pub id: String,
    /// `created`, `updated`, `unchanged` or `notFound`.
    pub outcome: String,
}

/// Parse a channel id given as decimal or `0x` hex.
pub fn parse_channel_id(raw: &str) -> Result<ChannelId, ErrorObjectOwned> {
    ChannelId::parse(raw).map_err(|e| rpc_error(-1, &e.to_string()))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

fn internal(e: PaygError) -> ErrorObjectOwned {
    rpc_error(-1, &e.to_string())
}

fn outcome_name(outcome: &ApplyOutcome) -> &'static str {
    match outcome {
        ApplyOutcome::Created => "created",
        ApplyOutcome::Updated => "updated",
        ApplyOutcome::Unchanged => "unchanged",
        ApplyOutcome::NotFound => "notFound",
        ApplyOutcome::NotForThisNode => "notForThisNode",
        ApplyOutcome::LaborRecorded(_) => "laborRecorded",
    }
}

/// The payg JSON-RPC interface.
#[rpc(server)]
pub trait PaygRpc {
    /// Returns one channel record.
    #[method(name = "getchannel")]
    async fn get_channel(&self, id: String) -> Result<Channel, ErrorObjectOwned>;

    /// Returns every channel that is not finalized.
    #[method(name = "listalivechannels")]
    async fn list_alive_channels(&self) -> Result<Vec<Channel>, ErrorObjectOwned>;

    /// Returns the labor rows recorded for a deployment, in append order.
    #[method(name = "getlabor")]
    async fn get_labor(&self, deployment_id: String) -> Result<Vec<ChannelLabor>, ErrorObjectOwned>;

    /// Forces a full resync of one channel from the chain.
    #[method(name = "syncchannel")]
    async fn sync_channel(&self, id: String) -> Result<SyncResultJson, ErrorObjectOwned>;

    /// Returns engine counters and the last sweep outcome.
    #[method(name = "getsyncstatus")]
    async fn get_sync_status(&self) -> Result<SyncStatus, ErrorObjectOwned>;
}

/// Implementation of the payg JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl PaygRpcServer for RpcServerImpl {
    async fn get_channel(&self, id: String) -> Result<Channel, ErrorObjectOwned> {
        let id = parse_channel_id(&id)?;
        self.node
            .get_channel(&id)
            .map_err(internal)?
            .ok_or_else(|| rpc_error(-5, "channel not found"))
    }

    async fn list_alive_channels(&self) -> Result<Vec<Channel>, ErrorObjectOwned> {
        self.node.alive_channels().map_err(internal)
    }

    async fn get_labor(&self, deployment_id: String) -> Result<Vec<ChannelLabor>, ErrorObjectOwned> {
        self.node
            .labor_for_deployment(&deployment_id)
            .map_err(internal)
    }

    async fn sync_channel(&self, id: String) -> Result<SyncResultJson, ErrorObjectOwned> {
        let id = parse_channel_id(&id)?;
        let outcome = self.node.sync_channel(&id).await.map_err(internal)?;
        Ok(SyncResultJson {
            id: id.to_string(),
            outcome: outcome_name(&outcome).to_string(),
        })
    }

    async fn get_sync_status(&self) -> Result<SyncStatus, ErrorObjectOwned> {
        self.node.sync_status().map_err(internal)
    }
}

/// Start the JSON-RPC server on the given address.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, PaygError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| PaygError::Storage(format!("RPC server error: {e}")))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_id_hex_and_decimal() {
        assert_eq!(parse_channel_id("0x1f").unwrap().as_str(), "31");
        assert_eq!(parse_channel_id("31").unwrap().as_str(), "31");
    }

    #[test]
    fn parse_channel_id_invalid() {
        let err = parse_channel_id("channel-1").unwrap_err();
        assert!(err.message().contains("invalid channel id"));
    }

    #[test]
    fn outcome_names() {
        assert_eq!(outcome_name(&ApplyOutcome::Created), "created");
        assert_eq!(outcome_name(&ApplyOutcome::NotFound), "notFound");
    }

    #[test]
    fn sync_result_serializes() {
        let json = serde_json::to_value(SyncResultJson {
            id: "31".into(),
            outcome: "updated".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "updated");
    }
}
