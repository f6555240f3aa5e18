//! Trustwatch Transport - Shared network-request channel
//!
//! This crate provides:
//! - Network request messages handed to the polling/fetch layer
//! - Cancellation tokens carried by every request
//! - The request client shared by both downloaders
//! - A tokio channel transport bridging the synchronous core to async I/O

pub mod cancel;
pub mod request;
pub mod client;
pub mod channel;

pub use cancel::*;
pub use request::*;
pub use client::*;
pub use channel::*;
