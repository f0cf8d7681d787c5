//! Persistent event subscription on top of a polled event feed.
//!
//! The poller keeps a block cursor (the next block to read), asks the feed
//! for events in bounded ranges up to the chain head, forwards them in
//! `(block, log index)` order, and only then advances and persists the
//! cursor. A failed poll leaves the cursor where it was, so the range is
//! retried on the next interval. Events at the boundary may be delivered
//! twice across a restart; handlers are idempotent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use payg_core::channel_store::ChannelStore;
use payg_core::constants::MAX_EVENT_BLOCK_RANGE;
use payg_core::error::PaygError;
use payg_core::events::{ChannelEvent, LoggedEvent};

/// Source of decoded contract events by block range.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Current chain head height.
    async fn head(&self) -> Result<u64, PaygError>;

    /// Events emitted in blocks `from_block..=to_block`.
    async fn events(&self, from_block: u64, to_block: u64) -> Result<Vec<LoggedEvent>, PaygError>;
}

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The cursor is already past the head.
    UpToDate,
    /// Blocks `from..=to` were read and `forwarded` events sent on.
    Advanced { from: u64, to: u64, forwarded: usize },
    /// The subscriber side has gone away.
    Closed,
}

pub struct EventPoller {
    feed: Arc<dyn EventFeed>,
    store: Arc<dyn ChannelStore>,
    tx: mpsc::Sender<ChannelEvent>,
    start_block: u64,
    max_range: u64,
}

impl EventPoller {
    pub fn new(
        feed: Arc<dyn EventFeed>,
        store: Arc<dyn ChannelStore>,
        tx: mpsc::Sender<ChannelEvent>,
        start_block: u64,
    ) -> Self {
        Self {
            feed,
            store,
            tx,
            start_block,
            max_range: MAX_EVENT_BLOCK_RANGE,
        }
    }

    /// Override the largest block range requested per poll.
    pub fn with_max_range(mut self, max_range: u64) -> Self {
        self.max_range = max_range.max(1);
        self
    }

    /// Next block to read: the stored cursor, or the configured start.
    pub fn cursor(&self) -> Result<u64, PaygError> {
        Ok(self.store.event_cursor()?.unwrap_or(self.start_block))
    }

    /// Read and forward one range of events.
    pub async fn poll_once(&self) -> Result<PollOutcome, PaygError> {
        let from = self.cursor()?;
        let head = self.feed.head().await?;
        if from > head {
            return Ok(PollOutcome::UpToDate);
        }
        let to = head.min(from.saturating_add(self.max_range - 1));

        let mut events = self.feed.events(from, to).await?;
        events.sort_by_key(|e| (e.block_number, e.log_index));

        let forwarded = events.len();
        for logged in events {
            if self.tx.send(logged.event).await.is_err() {
                return Ok(PollOutcome::Closed);
            }
        }

        self.store.set_event_cursor(to + 1)?;
        debug!(from, to, forwarded, "event range forwarded");
        Ok(PollOutcome::Advanced {
            from,
            to,
            forwarded,
        })
    }

    /// Poll every `period` until the subscriber side closes.
    ///
    /// While behind the head, ranges are read back to back without waiting.
    pub async fn run(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(cursor = ?self.cursor().ok(), "event poller started");

        loop {
            interval.tick().await;
            loop {
                match self.poll_once().await {
                    Ok(PollOutcome::Advanced { to, .. }) => {
                        match self.feed.head().await {
                            Ok(head) if to < head => continue,
                            _ => break,
                        }
                    }
                    Ok(PollOutcome::UpToDate) => break,
                    Ok(PollOutcome::Closed) => {
                        info!("event subscriber closed, stopping poller");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "event poll failed, will retry");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use payg_core::channel_store::MemoryChannelStore;
    use payg_core::error::ChainError;
    use payg_core::events::{ExtendEvent, LoggedEvent};

    #[derive(Default)]
    struct ScriptedFeed {
        head: Mutex<u64>,
        events: Mutex<Vec<LoggedEvent>>,
        fail: Mutex<bool>,
        requested: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl EventFeed for ScriptedFeed {
        async fn head(&self) -> Result<u64, PaygError> {
            Ok(*self.head.lock())
        }

        async fn events(&self, from: u64, to: u64) -> Result<Vec<LoggedEvent>, PaygError> {
            self.requested.lock().push((from, to));
            if *self.fail.lock() {
                return Err(ChainError::Transport("gateway down".into()).into());
            }
            Ok(self
                .events
                .lock()
                .iter()
                .filter(|e| (from..=to).contains(&e.block_number))
                .cloned()
                .collect())
        }
    }

    fn extend(block: u64, log_index: u64, expired_at: u64) -> LoggedEvent {
        LoggedEvent {
            block_number: block,
            log_index,
            event: ChannelEvent::Extend(ExtendEvent {
                channel_id: "1".into(),
                expired_at,
            }),
        }
    }

    fn setup(start: u64) -> (
        Arc<ScriptedFeed>,
        Arc<MemoryChannelStore>,
        EventPoller,
        mpsc::Receiver<ChannelEvent>,
    ) {
        let feed = Arc::new(ScriptedFeed::default());
        let store = Arc::new(MemoryChannelStore::new());
        let (tx, rx) = mpsc::channel(64);
        let poller = EventPoller::new(feed.clone(), store.clone(), tx, start);
        (feed, store, poller, rx)
    }

    fn expiry(event: ChannelEvent) -> u64 {
        match event {
            ChannelEvent::Extend(e) => e.expired_at,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn forwards_in_block_order_and_persists_cursor() {
        let (feed, store, poller, mut rx) = setup(10);
        *feed.head.lock() = 20;
        *feed.events.lock() = vec![extend(15, 1, 3), extend(12, 0, 1), extend(15, 0, 2)];

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Advanced {
                from: 10,
                to: 20,
                forwarded: 3
            }
        );
        assert_eq!(store.event_cursor().unwrap(), Some(21));

        let order: Vec<u64> = vec![
            expiry(rx.recv().await.unwrap()),
            expiry(rx.recv().await.unwrap()),
            expiry(rx.recv().await.unwrap()),
        ];
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn up_to_date_when_cursor_past_head() {
        let (feed, store, poller, _rx) = setup(0);
        store.set_event_cursor(11).unwrap();
        *feed.head.lock() = 10;
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::UpToDate);
        assert!(feed.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_cursor() {
        let (feed, store, poller, _rx) = setup(5);
        *feed.head.lock() = 9;
        *feed.fail.lock() = true;

        assert!(poller.poll_once().await.is_err());
        assert_eq!(store.event_cursor().unwrap(), None);

        *feed.fail.lock() = false;
        poller.poll_once().await.unwrap();
        assert_eq!(feed.requested.lock().as_slice(), &[(5, 9), (5, 9)]);
        assert_eq!(store.event_cursor().unwrap(), Some(10));
    }

    #[tokio::test]
    async fn ranges_are_bounded() {
        let (feed, store, poller, _rx) = setup(0);
        let poller = poller.with_max_range(100);
        *feed.head.lock() = 250;

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        assert_eq!(
            feed.requested.lock().as_slice(),
            &[(0, 99), (100, 199), (200, 250)]
        );
        assert_eq!(store.event_cursor().unwrap(), Some(251));
    }

    #[tokio::test]
    async fn closed_subscriber_stops_without_advancing() {
        let (feed, store, poller, rx) = setup(0);
        *feed.head.lock() = 3;
        *feed.events.lock() = vec![extend(1, 0, 1)];
        drop(rx);

        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Closed);
        assert_eq!(store.event_cursor().unwrap(), None);
    }

    #[tokio::test]
    async fn resumes_from_stored_cursor() {
        let (feed, store, poller, _rx) = setup(0);
        store.set_event_cursor(40).unwrap();
        *feed.head.lock() = 45;
        poller.poll_once().await.unwrap();
        assert_eq!(feed.requested.lock().as_slice(), &[(40, 45)]);
    }
}
