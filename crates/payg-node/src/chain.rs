//! JSON-RPC client for the contract gateway.
//!
//! The gateway owns the contract binding and ABI decoding; this side only
//! speaks JSON-RPC 2.0 over HTTP:
//!
//! | method                  | params                   | result                    |
//! |-------------------------|--------------------------|---------------------------|
//! | `payg_getIndexer`       | `[]`                     | address or `null`         |
//! | `payg_blockNumber`      | `[]`                     | integer (or hex string)   |
//! | `payg_getChannel`       | `[id]`                   | channel snapshot or `null`|
//! | `payg_getChannelEvents` | `[fromBlock, toBlock]`   | list of logged events     |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use payg_core::error::{ChainError, PaygError};
use payg_core::events::LoggedEvent;
use payg_core::normalize::{normalize_address, parse_u256};
use payg_core::traits::ChainReader;
use payg_core::types::{ChannelId, ChannelSnapshot};

use crate::poller::EventFeed;

/// [`ChainReader`] and [`EventFeed`] over the gateway's JSON-RPC API.
pub struct RpcChainReader {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcChainReader {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PaygError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform one JSON-RPC call and decode its `result`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });
        let resp: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Malformed(e.to_string()))?;
        parse_response(resp)
    }
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Extract `result` from a JSON-RPC response, mapping `error` objects.
pub fn parse_response<T: DeserializeOwned>(mut resp: Value) -> Result<T, ChainError> {
    if let Some(err) = resp.get("error").filter(|e| !e.is_null()) {
        let body: RpcErrorBody = serde_json::from_value(err.clone())
            .map_err(|_| ChainError::Malformed(format!("unrecognized error object: {err}")))?;
        return Err(ChainError::Rpc {
            code: body.code,
            message: body.message,
        });
    }
    let result = resp
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ChainError::Malformed("response has neither result nor error".into()))?;
    serde_json::from_value(result).map_err(|e| ChainError::Malformed(e.to_string()))
}

/// Block heights come back either as JSON numbers or `0x` quantities.
fn parse_height(value: &Value) -> Result<u64, ChainError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ChainError::Malformed(format!("block number out of range: {n}"))),
        Value::String(s) => parse_u256(s)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| ChainError::Malformed(format!("invalid block number: {s}"))),
        other => Err(ChainError::Malformed(format!("invalid block number: {other}"))),
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn own_identity(&self) -> Result<Option<String>, PaygError> {
        let identity: Option<String> = self.call("payg_getIndexer", json!([])).await?;
        match identity.filter(|s| !s.is_empty()) {
            Some(addr) => Ok(Some(normalize_address(&addr)?)),
            None => Ok(None),
        }
    }

    async fn chain_height(&self) -> Result<u64, PaygError> {
        let raw: Value = self.call("payg_blockNumber", json!([])).await?;
        Ok(parse_height(&raw)?)
    }

    async fn channel_state(&self, id: &ChannelId) -> Result<Option<ChannelSnapshot>, PaygError> {
        Ok(self
            .call("payg_getChannel", json!([id.as_str()]))
            .await?)
    }
}

#[async_trait]
impl EventFeed for RpcChainReader {
    async fn head(&self) -> Result<u64, PaygError> {
        self.chain_height().await
    }

    async fn events(&self, from_block: u64, to_block: u64) -> Result<Vec<LoggedEvent>, PaygError> {
        Ok(self
            .call("payg_getChannelEvents", json!([from_block, to_block]))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payg_core::types::ChannelStatus;

    #[test]
    fn parse_result_value() {
        let resp = json!({"jsonrpc": "2.0", "id": 1, "result": 42});
        let height: u64 = parse_response(resp).unwrap();
        assert_eq!(height, 42);
    }

    #[test]
    fn parse_null_result_as_none() {
        let resp = json!({"jsonrpc": "2.0", "id": 1, "result": null});
        let identity: Option<String> = parse_response(resp).unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn parse_error_object() {
        let resp = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "method not found"}
        });
        let err = parse_response::<u64>(resp).unwrap_err();
        assert_eq!(
            err,
            ChainError::Rpc {
                code: -32601,
                message: "method not found".into()
            }
        );
    }

    #[test]
    fn parse_missing_result_is_malformed() {
        let err = parse_response::<u64>(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert!(matches!(err, ChainError::Malformed(_)));
    }

    #[test]
    fn parse_channel_snapshot() {
        let resp = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "result": {
                "id": "12",
                "status": "TERMINATING",
                "indexer": "0x1111111111111111111111111111111111111111",
                "consumer": "0x2222222222222222222222222222222222222222",
                "agent": "0x2222222222222222222222222222222222222222",
                "total": "1000",
                "spent": "250",
                "price": "10",
                "deploymentId": "QmDeployment",
                "expiredAt": 1700000000,
                "terminatedAt": 1700003600,
                "terminateByIndexer": true
            }
        });
        let snapshot: Option<ChannelSnapshot> = parse_response(resp).unwrap();
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.status, ChannelStatus::Terminating);
        assert_eq!(snapshot.spent, "250");
        assert!(snapshot.terminate_by_indexer);
        assert_eq!(snapshot.deployment_id, "QmDeployment");
        assert_eq!(snapshot.expired_at, 1_700_000_000);
    }

    #[test]
    fn snapshot_missing_fields_is_malformed() {
        let resp = json!({
            "jsonrpc": "2.0",
            "id": 8,
            "result": {
                "id": "12",
                "status": "OPEN",
                "indexer": "0x1111111111111111111111111111111111111111",
                "consumer": "0x2222222222222222222222222222222222222222",
                "agent": "0x2222222222222222222222222222222222222222",
                "total": "1000",
                "spent": "0",
                "price": "10",
                "terminateByIndexer": false
            }
        });
        let err = parse_response::<Option<ChannelSnapshot>>(resp).unwrap_err();
        assert!(matches!(err, ChainError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn height_accepts_number_and_hex() {
        assert_eq!(parse_height(&json!(1234)).unwrap(), 1234);
        assert_eq!(parse_height(&json!("0x4d2")).unwrap(), 1234);
        assert!(parse_height(&json!("soon")).is_err());
        assert!(parse_height(&json!(null)).is_err());
    }

    #[test]
    fn client_builds() {
        let reader = RpcChainReader::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert_eq!(reader.endpoint(), "http://127.0.0.1:1");
    }
}
