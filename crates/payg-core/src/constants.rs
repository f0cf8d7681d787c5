//! Engine constants and configuration defaults.

/// Default port for the JSON-RPC query server.
pub const DEFAULT_RPC_PORT: u16 = 28_400;

/// Default interval between reconciliation sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default interval between event-feed polls, in seconds.
pub const DEFAULT_EVENT_POLL_INTERVAL_SECS: u64 = 5;

/// Maximum number of blocks requested from the event feed in one poll.
pub const MAX_EVENT_BLOCK_RANGE: u64 = 2_000;

/// Timeout applied to every outbound HTTP request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Page size used when listing live channels from the index.
pub const INDEX_PAGE_SIZE: usize = 100;

/// Capacity of the notification broadcast channel.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 1_024;

/// Capacity of the event queue between the feed and the subscriber.
pub const EVENT_QUEUE_CAPACITY: usize = 4_096;

/// Length of an ABI-encoded word in bytes.
pub const ABI_WORD_LEN: usize = 32;

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;
