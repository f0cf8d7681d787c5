//! Fan-out of channel lifecycle notifications.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use payg_core::constants::NOTIFICATION_CHANNEL_CAPACITY;
use payg_core::traits::NotificationSink;
use payg_core::types::{Channel, ChannelNotification};

/// A notification together with the record it was emitted for.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub kind: ChannelNotification,
    pub channel: Channel,
}

/// [`NotificationSink`] backed by a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest updates; they never slow down
/// the writer. Having no subscribers at all is not an error.
pub struct BroadcastSink {
    tx: broadcast::Sender<ChannelUpdate>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, channel: &Channel, kind: ChannelNotification) {
        let update = ChannelUpdate {
            kind,
            channel: channel.clone(),
        };
        if self.tx.send(update).is_err() {
            trace!(channel_id = %channel.id, ?kind, "no notification subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snapshot, CONSUMER};
    use payg_core::types::ChannelStatus;

    fn channel(id: &str) -> Channel {
        Channel::from_snapshot(&snapshot(id, ChannelStatus::Open, "100"))
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();

        sink.notify(&channel("1"), ChannelNotification::Opened);
        sink.notify(&channel("1"), ChannelNotification::State);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChannelNotification::Opened);
        assert_eq!(first.channel.agent, CONSUMER);
        assert_eq!(rx.recv().await.unwrap().kind, ChannelNotification::State);
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        let sink = BroadcastSink::new();
        sink.notify(&channel("1"), ChannelNotification::Stopped);
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let sink = BroadcastSink::with_capacity(2);
        let mut rx = sink.subscribe();
        for _ in 0..4 {
            sink.notify(&channel("1"), ChannelNotification::State);
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
    }

    #[test]
    fn update_serializes_kind_lowercase() {
        let update = ChannelUpdate {
            kind: ChannelNotification::Opened,
            channel: channel("1"),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "opened");
        assert_eq!(json["channel"]["status"], "OPEN");
    }
}
