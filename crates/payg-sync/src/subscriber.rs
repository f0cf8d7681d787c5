//! Push path: dispatch contract events to the coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use payg_core::events::ChannelEvent;
use payg_core::error::PaygError;
use payg_core::types::ChannelId;

use crate::coordinator::{ApplyOutcome, SyncCoordinator};

/// Counters for one subscription run.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub received: u64,
    pub applied: u64,
    pub failed: u64,
    pub panicked: u64,
}

/// A finished handler task.
struct Handled {
    event: ChannelEvent,
    channel: Option<ChannelId>,
    seq: u64,
    result: Result<ApplyOutcome, PaygError>,
}

/// Completion signal of the most recently queued handler, per channel.
type Tails = HashMap<ChannelId, (u64, oneshot::Receiver<()>)>;

/// Consumes the event stream and runs one handler task per event.
///
/// Handlers for different channels run concurrently. Handlers for the same
/// channel are chained: each waits for its predecessor to finish, so a
/// channel's events are applied in the order they were received. Labor
/// events are not chained. A failing or panicking handler is logged and
/// does not stop the subscription.
pub struct EventSubscriber {
    coordinator: Arc<SyncCoordinator>,
}

impl EventSubscriber {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Run until every sender of `events` is dropped, then wait for the
    /// handlers still in flight.
    pub async fn run(&self, mut events: mpsc::Receiver<ChannelEvent>) -> SubscriberStats {
        let mut stats = SubscriberStats::default();
        let mut tails = Tails::new();
        let mut handlers: JoinSet<Handled> = JoinSet::new();

        while let Some(event) = events.recv().await {
            stats.received += 1;
            let seq = stats.received;
            // Malformed ids are not chained; the handler rejects them.
            let channel = event.channel_id().and_then(|raw| ChannelId::parse(raw).ok());
            let (previous, done) = match &channel {
                Some(id) => {
                    let (done, finished) = oneshot::channel();
                    let previous = tails.insert(id.clone(), (seq, finished)).map(|(_, rx)| rx);
                    (previous, Some(done))
                }
                None => (None, None),
            };

            let coordinator = Arc::clone(&self.coordinator);
            handlers.spawn(async move {
                if let Some(previous) = previous {
                    // Err means the predecessor panicked; carry on regardless.
                    let _ = previous.await;
                }
                let result = coordinator.apply(&event).await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
                Handled {
                    event,
                    channel,
                    seq,
                    result,
                }
            });

            while let Some(joined) = handlers.try_join_next() {
                record(&mut stats, &mut tails, joined);
            }
        }

        info!(in_flight = handlers.len(), "event stream closed, draining handlers");
        while let Some(joined) = handlers.join_next().await {
            record(&mut stats, &mut tails, joined);
        }
        stats
    }
}

fn record(stats: &mut SubscriberStats, tails: &mut Tails, joined: Result<Handled, JoinError>) {
    let handled = match joined {
        Ok(handled) => handled,
        Err(e) => {
            stats.panicked += 1;
            error!(error = %e, "event handler task aborted");
            return;
        }
    };

    // Nothing queued behind this handler: forget the channel's tail.
    if let Some(id) = &handled.channel {
        if tails.get(id).is_some_and(|(seq, _)| *seq == handled.seq) {
            tails.remove(id);
        }
    }

    let event = &handled.event;
    match &handled.result {
        Ok(outcome) => {
            stats.applied += 1;
            debug!(event = event.name(), channel_id = ?event.channel_id(), ?outcome, "event applied");
        }
        Err(e) => {
            stats.failed += 1;
            warn!(event = event.name(), channel_id = ?event.channel_id(), error = %e, "event handler failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use payg_core::channel_store::{ChannelStore, MemoryChannelStore};
    use payg_core::events::{ExtendEvent, FundEvent, TerminateEvent};
    use payg_core::types::ChannelStatus;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryChannelStore>, EventSubscriber) {
        let (store, _, subscriber) = setup_with_chain();
        (store, subscriber)
    }

    fn setup_with_chain() -> (Arc<MemoryChannelStore>, Arc<MockChain>, EventSubscriber) {
        let store = Arc::new(MemoryChannelStore::new());
        let chain = Arc::new(MockChain::registered(INDEXER));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Arc::new(SyncCoordinator::new(store.clone(), chain.clone(), sink));
        (store, chain, EventSubscriber::new(coordinator))
    }

    fn fund(id: &str, total: &str) -> ChannelEvent {
        ChannelEvent::Fund(FundEvent {
            channel_id: id.into(),
            total: total.into(),
        })
    }

    #[tokio::test]
    async fn applies_stream_and_drains_on_close() {
        let (store, subscriber) = setup();
        let (tx, rx) = mpsc::channel(16);

        tx.send(ChannelEvent::Open(open_event("1", b""))).await.unwrap();
        tx.send(ChannelEvent::Open(open_event("2", b""))).await.unwrap();
        drop(tx);

        let stats = subscriber.run(rx).await;
        assert_eq!(stats.received, 2);
        assert_eq!(stats.applied, 2);
        assert_eq!(store.channel_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_stream() {
        let (store, subscriber) = setup();
        let (tx, rx) = mpsc::channel(16);

        tx.send(fund("not a number", "1")).await.unwrap();
        tx.send(ChannelEvent::Open(open_event("3", b""))).await.unwrap();
        drop(tx);

        let stats = subscriber.run(rx).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.applied, 1);
        assert!(store.get_channel(&ChannelId::parse("3").unwrap()).unwrap().is_some());
    }

    #[tokio::test]
    async fn redelivered_terminate_settles_once() {
        let (store, subscriber) = setup();
        let (tx, rx) = mpsc::channel(16);

        tx.send(ChannelEvent::Open(open_event("5", b""))).await.unwrap();
        drop(tx);
        subscriber.run(rx).await;

        let (tx, rx) = mpsc::channel(16);
        let terminate = TerminateEvent {
            channel_id: "5".into(),
            spent: "40".into(),
            terminated_at: TERMINATED_AT,
            terminate_by_indexer: false,
        };
        for _ in 0..3 {
            tx.send(ChannelEvent::Terminate(terminate.clone())).await.unwrap();
        }
        drop(tx);
        let stats = subscriber.run(rx).await;
        assert_eq!(stats.applied, 3);

        let c = store.get_channel(&ChannelId::parse("5").unwrap()).unwrap().unwrap();
        assert_eq!(c.status, ChannelStatus::Terminating);
        assert_eq!(c.onchain, "40");
    }

    // ------------------------------------------------------------------------
    // Per-channel ordering
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn follow_ups_wait_for_slow_open() {
        let (store, chain, subscriber) = setup_with_chain();
        chain.set_identity_delay(Some(Duration::from_millis(20)));
        let (tx, rx) = mpsc::channel(16);

        tx.send(ChannelEvent::Open(open_event("1", b""))).await.unwrap();
        tx.send(ChannelEvent::Extend(ExtendEvent {
            channel_id: "1".into(),
            expired_at: 1_800_000_000,
        }))
        .await
        .unwrap();
        tx.send(fund("0x1", "5000")).await.unwrap();
        drop(tx);

        let stats = subscriber.run(rx).await;
        assert_eq!(stats.applied, 3);

        let c = store.get_channel(&ChannelId::parse("1").unwrap()).unwrap().unwrap();
        assert_eq!(c.expired_at, 1_800_000_000);
        assert_eq!(c.terminated_at, 1_800_000_000);
        assert_eq!(c.total, "5000");
    }

    #[tokio::test]
    async fn same_channel_events_apply_in_receive_order() {
        let (store, chain, subscriber) = setup_with_chain();
        chain.set_identity_delay(Some(Duration::from_millis(5)));
        let (tx, rx) = mpsc::channel(64);

        tx.send(ChannelEvent::Open(open_event("4", b""))).await.unwrap();
        tx.send(ChannelEvent::Open(open_event("5", b""))).await.unwrap();
        for total in 2..=20u64 {
            tx.send(fund("4", &(total * 100).to_string())).await.unwrap();
            tx.send(fund("5", &(total * 10).to_string())).await.unwrap();
        }
        drop(tx);

        let stats = subscriber.run(rx).await;
        assert_eq!(stats.failed + stats.panicked, 0);
        let total = |id: &str| {
            store
                .get_channel(&ChannelId::parse(id).unwrap())
                .unwrap()
                .unwrap()
                .total
        };
        assert_eq!(total("4"), "2000");
        assert_eq!(total("5"), "200");
    }

    #[tokio::test]
    async fn failed_handler_does_not_block_its_channel() {
        let (store, subscriber) = setup();
        let (tx, rx) = mpsc::channel(16);

        tx.send(ChannelEvent::Open(open_event("6", b""))).await.unwrap();
        tx.send(fund("6", "not an amount")).await.unwrap();
        tx.send(fund("6", "4000")).await.unwrap();
        drop(tx);

        let stats = subscriber.run(rx).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.applied, 2);
        let c = store.get_channel(&ChannelId::parse("6").unwrap()).unwrap().unwrap();
        assert_eq!(c.total, "4000");
    }
}
