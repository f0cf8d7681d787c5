//! # payg-core
//! Foundation types and traits for the payg channel synchronization engine.

pub mod channel_store;
pub mod constants;
pub mod error;
pub mod events;
pub mod normalize;
pub mod traits;
pub mod types;
