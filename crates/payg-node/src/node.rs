//! Sync node composition and run loop.
//!
//! The [`Node`] wires the channel store, the chain gateway, the channel
//! index and the notification fan-out into the sync engine: the event
//! poller feeds the subscriber (push path) and the sweeper reconciles on a
//! fixed interval (pull path).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use payg_core::channel_store::ChannelStore;
use payg_core::constants::EVENT_QUEUE_CAPACITY;
use payg_core::error::PaygError;
use payg_core::events::ChannelEvent;
use payg_core::traits::{ChainReader, ChannelIndex};
use payg_core::types::{Channel, ChannelId, ChannelLabor};
use payg_sync::{
    ApplyOutcome, BroadcastSink, ChannelUpdate, EventSubscriber, SubscriberStats, SweepOutcome,
    Sweeper, SyncCoordinator,
};

use crate::chain::RpcChainReader;
use crate::config::NodeConfig;
use crate::index::GraphqlChannelIndex;
use crate::poller::{EventFeed, EventPoller};
use crate::storage::RocksStore;

/// Snapshot of the engine's health for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub started_at: DateTime<Utc>,
    pub channels: usize,
    pub alive_channels: usize,
    pub labor_rows: u64,
    /// Next block the event poller will read.
    pub event_cursor: Option<u64>,
    pub sweep_running: bool,
    pub last_sweep: Option<SweepOutcome>,
}

/// The sync node, composing store, collaborators and the sync engine.
pub struct Node {
    config: NodeConfig,
    store: Arc<dyn ChannelStore>,
    feed: Option<Arc<dyn EventFeed>>,
    coordinator: Arc<SyncCoordinator>,
    sweeper: Arc<Sweeper>,
    sink: Arc<BroadcastSink>,
    started_at: DateTime<Utc>,
}

impl Node {
    /// Create a node backed by RocksDB and the configured gateway and index.
    pub async fn new(config: NodeConfig) -> Result<Arc<Self>, PaygError> {
        let store: Arc<dyn ChannelStore> = Arc::new(RocksStore::open(config.db_path())?);
        let chain = Arc::new(RpcChainReader::new(
            &config.chain_url,
            config.request_timeout(),
        )?);
        let index: Arc<dyn ChannelIndex> = Arc::new(GraphqlChannelIndex::new(
            &config.index_url,
            config.request_timeout(),
        )?);

        let feed: Arc<dyn EventFeed> = chain.clone();
        Ok(Self::with_backends(config, store, chain, index, Some(feed)))
    }

    /// Create a node over caller-supplied collaborators.
    ///
    /// With `feed = None` the push path only receives what is passed to
    /// [`run_with`](Self::run_with).
    pub fn with_backends(
        config: NodeConfig,
        store: Arc<dyn ChannelStore>,
        chain: Arc<dyn ChainReader>,
        index: Arc<dyn ChannelIndex>,
        feed: Option<Arc<dyn EventFeed>>,
    ) -> Arc<Self> {
        let sink = Arc::new(BroadcastSink::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            sink.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&coordinator),
            chain,
            index,
            Arc::clone(&store),
        ));

        Arc::new(Self {
            config,
            store,
            feed,
            coordinator,
            sweeper,
            sink,
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run the event poller, subscriber and sweeper until the event stream
    /// ends.
    pub async fn run(self: &Arc<Self>) -> SubscriberStats {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let _idle_tx = match &self.feed {
            Some(feed) => {
                let poller = EventPoller::new(
                    Arc::clone(feed),
                    Arc::clone(&self.store),
                    tx,
                    self.config.event_start_block,
                );
                tokio::spawn(poller.run(self.config.event_poll_interval()));
                None
            }
            None => {
                warn!("no event feed configured; push path idle");
                Some(tx)
            }
        };

        self.run_with(rx).await
    }

    /// Run the subscriber over `events` with the sweeper in the background.
    pub async fn run_with(self: &Arc<Self>, events: mpsc::Receiver<ChannelEvent>) -> SubscriberStats {
        let sweep_task = Arc::clone(&self.sweeper).spawn(self.config.sweep_interval());
        info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            "sync engine running"
        );

        let stats = EventSubscriber::new(Arc::clone(&self.coordinator))
            .run(events)
            .await;

        sweep_task.abort();
        info!(?stats, "sync engine stopped");
        stats
    }

    /// Apply one event directly, bypassing the queue.
    pub async fn apply_event(&self, event: &ChannelEvent) -> Result<ApplyOutcome, PaygError> {
        self.coordinator.apply(event).await
    }

    /// Run one reconciliation sweep now.
    pub async fn sweep_now(&self) -> SweepOutcome {
        self.sweeper.tick().await
    }

    /// Force a full resync of one channel from the chain.
    pub async fn sync_channel(&self, id: &ChannelId) -> Result<ApplyOutcome, PaygError> {
        self.coordinator.resync_channel(id).await
    }

    pub fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, PaygError> {
        self.store.get_channel(id)
    }

    pub fn alive_channels(&self) -> Result<Vec<Channel>, PaygError> {
        self.store.alive_channels()
    }

    pub fn labor_for_deployment(&self, deployment_id: &str) -> Result<Vec<ChannelLabor>, PaygError> {
        self.store.labor_for_deployment(deployment_id)
    }

    /// Receive every channel notification emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.sink.subscribe()
    }

    pub fn sync_status(&self) -> Result<SyncStatus, PaygError> {
        Ok(SyncStatus {
            started_at: self.started_at,
            channels: self.store.channel_count()?,
            alive_channels: self.store.alive_channels()?.len(),
            labor_rows: self.store.labor_count()?,
            event_cursor: self.store.event_cursor()?,
            sweep_running: self.sweeper.is_running(),
            last_sweep: self.sweeper.last_outcome(),
        })
    }
}
