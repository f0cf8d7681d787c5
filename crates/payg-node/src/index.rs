//! GraphQL client for the authoritative channel index.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use payg_core::constants::INDEX_PAGE_SIZE;
use payg_core::error::{IndexError, PaygError};
use payg_core::traits::ChannelIndex;
use payg_core::types::{ChannelId, ChannelStatus, ChannelView};

/// Live (non-finalized) state channels of one indexer, one page at a time.
pub const LIVE_CHANNELS_QUERY: &str = r#"
query LiveChannels($indexer: String!, $first: Int!, $offset: Int!) {
  stateChannels(
    first: $first
    offset: $offset
    orderBy: ID_ASC
    filter: { indexer: { equalTo: $indexer }, status: { notEqualTo: FINALIZED } }
  ) {
    nodes { id status agent total spent price }
  }
}
"#;

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<LiveChannelsData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveChannelsData {
    state_channels: NodeList,
}

#[derive(Deserialize)]
struct NodeList {
    nodes: Vec<RawChannel>,
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    status: String,
    agent: String,
    total: Value,
    spent: Value,
    price: Value,
}

/// [`ChannelIndex`] backed by a GraphQL endpoint.
pub struct GraphqlChannelIndex {
    client: Client,
    endpoint: String,
    page_size: usize,
}

impl GraphqlChannelIndex {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PaygError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            page_size: INDEX_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, indexer: &str, offset: usize) -> Result<Vec<ChannelView>, IndexError> {
        let body = json!({
            "query": LIVE_CHANNELS_QUERY,
            "variables": { "indexer": indexer, "first": self.page_size, "offset": offset },
        });
        let resp: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| IndexError::Malformed(e.to_string()))?;
        parse_page(resp)
    }
}

#[async_trait]
impl ChannelIndex for GraphqlChannelIndex {
    async fn live_channels(&self, indexer: &str) -> Result<Vec<ChannelView>, PaygError> {
        let mut all = Vec::new();
        loop {
            let page = self.fetch_page(indexer, all.len()).await?;
            let last = page.len() < self.page_size;
            all.extend(page);
            if last {
                break;
            }
        }
        debug!(indexer, live = all.len(), "fetched live channels from index");
        Ok(all)
    }
}

/// Decode one GraphQL response page into channel views.
///
/// Ids are canonicalized to decimal; amounts may arrive as strings or
/// numbers and are passed through as strings for the sweep to normalize.
pub fn parse_page(resp: Value) -> Result<Vec<ChannelView>, IndexError> {
    let resp: GraphqlResponse =
        serde_json::from_value(resp).map_err(|e| IndexError::Malformed(e.to_string()))?;
    if !resp.errors.is_empty() {
        let messages: Vec<String> = resp.errors.into_iter().map(|e| e.message).collect();
        return Err(IndexError::Query(messages.join("; ")));
    }
    let data = resp
        .data
        .ok_or_else(|| IndexError::Malformed("response has no data".into()))?;

    data.state_channels
        .nodes
        .into_iter()
        .map(|raw| {
            let id = ChannelId::parse(&raw.id)
                .map_err(|e| IndexError::Malformed(e.to_string()))?;
            let status = ChannelStatus::parse(&raw.status)
                .map_err(|e| IndexError::Malformed(e.to_string()))?;
            Ok(ChannelView {
                id: id.to_string(),
                status,
                agent: raw.agent,
                total: scalar(&raw.total)?,
                spent: scalar(&raw.spent)?,
                price: scalar(&raw.price)?,
            })
        })
        .collect()
}

/// BigInt scalars are strings in most GraphQL servers, numbers in some.
fn scalar(value: &Value) -> Result<String, IndexError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(IndexError::Malformed(format!("expected integer, got {other}"))),
    }
}
