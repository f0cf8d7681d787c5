//! Scenario, property and end-to-end test suite for the payg sync engine.
//!
//! Integration tests live under `tests/`; [`helpers`] wires the engine over
//! in-process doubles and provides a fake contract gateway that speaks the
//! real JSON-RPC protocol.

pub mod helpers;
