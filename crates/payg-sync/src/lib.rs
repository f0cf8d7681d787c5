//! # payg-sync — channel synchronization engine.
//!
//! Keeps the local channel ledger consistent with the channel contract along
//! two independent paths:
//! - [`subscriber::EventSubscriber`] — push path; applies contract events
//!   incrementally through the [`coordinator::SyncCoordinator`]
//! - [`sweeper::Sweeper`] — pull path; periodically diffs locally alive
//!   channels against the authoritative index and forces full resyncs
//!
//! Writes for a channel id are serialized by [`locks::ChannelLocks`], so the
//! two paths never lose each other's updates. The subscriber additionally
//! applies each channel's events in the order they were received.

pub mod coordinator;
pub mod latch;
pub mod locks;
pub mod notify;
pub mod subscriber;
pub mod sweeper;

pub use coordinator::{ApplyOutcome, SyncCoordinator};
pub use latch::{SweepGuard, SweepLatch};
pub use locks::ChannelLocks;
pub use notify::{BroadcastSink, ChannelUpdate};
pub use subscriber::{EventSubscriber, SubscriberStats};
pub use sweeper::{compare_channel, plan_resyncs, SweepOutcome, SweepReport, Sweeper};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
