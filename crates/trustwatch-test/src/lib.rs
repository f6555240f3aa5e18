//! Trustwatch Test Harness - End-to-end validation of the downloaders
//!
//! This crate provides:
//! - An in-memory trust graph acting as rank oracle
//! - A transport that records every network request
//! - A harness wiring graph, database and controller together
//! - A seeded fuzzer driving random trust-graph mutations

pub mod graph;
pub mod recording;
pub mod harness;
pub mod fuzzer;

pub use graph::*;
pub use recording::*;
pub use harness::*;
pub use fuzzer::*;
