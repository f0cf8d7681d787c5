//! Shared helpers for scenario and end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::Mutex;

use payg_core::channel_store::{ChannelStore, MemoryChannelStore};
use payg_core::events::{ChannelEvent, LoggedEvent};
use payg_core::types::{Channel, ChannelId, ChannelSnapshot};
use payg_sync::testing::{MockChain, MockIndex, RecordingSink, INDEXER};
use payg_sync::{Sweeper, SyncCoordinator};

pub use payg_sync::testing;

/// The sync engine over in-memory store and scriptable collaborators.
pub struct Harness {
    pub store: Arc<MemoryChannelStore>,
    pub chain: Arc<MockChain>,
    pub index: Arc<MockIndex>,
    pub sink: Arc<RecordingSink>,
    pub coordinator: Arc<SyncCoordinator>,
    pub sweeper: Arc<Sweeper>,
}

impl Harness {
    /// Engine for a node registered as [`INDEXER`].
    pub fn new() -> Self {
        let store = Arc::new(MemoryChannelStore::new());
        let chain = Arc::new(MockChain::registered(INDEXER));
        let index = Arc::new(MockIndex::default());
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            chain.clone(),
            sink.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(
            coordinator.clone(),
            chain.clone(),
            index.clone(),
            store.clone(),
        ));
        Self {
            store,
            chain,
            index,
            sink,
            coordinator,
            sweeper,
        }
    }

    /// The stored record for `id`, panicking if absent.
    pub fn channel(&self, id: &str) -> Channel {
        let id = cid(id);
        self.store
            .get_channel(&id)
            .unwrap()
            .unwrap_or_else(|| panic!("channel {id} not stored"))
    }

    pub fn try_channel(&self, id: &str) -> Option<Channel> {
        self.store.get_channel(&cid(id)).unwrap()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical channel id from a literal.
pub fn cid(raw: &str) -> ChannelId {
    ChannelId::parse(raw).unwrap()
}

// ----------------------------------------------------------------------------
// Fake contract gateway
// ----------------------------------------------------------------------------

#[derive(Default)]
struct GatewayState {
    indexer: Option<String>,
    head: u64,
    channels: Vec<ChannelSnapshot>,
    events: Vec<LoggedEvent>,
}

/// The gateway's JSON-RPC surface, as consumed by `RpcChainReader`.
#[rpc(server, namespace = "payg")]
pub trait Gateway {
    #[method(name = "getIndexer")]
    async fn get_indexer(&self) -> Result<Option<String>, ErrorObjectOwned>;

    #[method(name = "blockNumber")]
    async fn block_number(&self) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "getChannel")]
    async fn get_channel(&self, id: String) -> Result<Option<ChannelSnapshot>, ErrorObjectOwned>;

    #[method(name = "getChannelEvents")]
    async fn get_channel_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LoggedEvent>, ErrorObjectOwned>;
}

/// In-process contract gateway served over HTTP JSON-RPC.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn registered(indexer: &str) -> Self {
        let gateway = Self::default();
        gateway.state.lock().indexer = Some(indexer.to_string());
        gateway
    }

    /// Record `event` at `block` and move the head there.
    pub fn emit(&self, block: u64, event: ChannelEvent) {
        let mut state = self.state.lock();
        let log_index = state.events.iter().filter(|e| e.block_number == block).count() as u64;
        state.events.push(LoggedEvent {
            block_number: block,
            log_index,
            event,
        });
        state.head = state.head.max(block);
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Install or replace the contract's view of a channel.
    pub fn set_channel(&self, snapshot: ChannelSnapshot) {
        let mut state = self.state.lock();
        state.channels.retain(|c| c.id != snapshot.id);
        state.channels.push(snapshot);
    }

    /// Serve on an ephemeral localhost port; returns the endpoint URL.
    pub async fn serve(&self) -> (String, ServerHandle) {
        let server = Server::builder().build("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = server.local_addr().unwrap();
        let handle = server.start(self.clone().into_rpc());
        (format!("http://{addr}"), handle)
    }
}

#[async_trait]
impl GatewayServer for FakeGateway {
    async fn get_indexer(&self) -> Result<Option<String>, ErrorObjectOwned> {
        Ok(self.state.lock().indexer.clone())
    }

    async fn block_number(&self) -> Result<u64, ErrorObjectOwned> {
        Ok(self.state.lock().head)
    }

    async fn get_channel(&self, id: String) -> Result<Option<ChannelSnapshot>, ErrorObjectOwned> {
        let id = ChannelId::parse(&id)
            .map_err(|e| ErrorObjectOwned::owned(-32602, e.to_string(), None::<()>))?;
        Ok(self
            .state
            .lock()
            .channels
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn get_channel_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LoggedEvent>, ErrorObjectOwned> {
        Ok(self
            .state
            .lock()
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }
}
