//! # payg-node — sync node: RocksDB, gateway and index clients, RPC.
//!
//! Composes the payg sync engine into a running node:
//! - [`storage::RocksStore`] — persistent channel ledger backed by RocksDB
//! - [`chain::RpcChainReader`] — contract gateway client (chain reads and events)
//! - [`poller::EventPoller`] — persistent event subscription with a stored cursor
//! - [`index::GraphqlChannelIndex`] — authoritative live-channel index client
//! - [`node::Node`] — wiring and run loop
//! - [`rpc`] — JSON-RPC server for queries and admin resyncs
//! - [`config::NodeConfig`] — layered node configuration

pub mod chain;
pub mod config;
pub mod index;
pub mod node;
pub mod poller;
pub mod rpc;
pub mod storage;

pub use chain::RpcChainReader;
pub use config::NodeConfig;
pub use index::GraphqlChannelIndex;
pub use node::{Node, SyncStatus};
pub use poller::{EventFeed, EventPoller};
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
