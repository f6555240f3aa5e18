//! Trustwatch State - Transactional command store
//!
//! This crate holds the durable watch bookkeeping:
//! - Committed watch table (fast downloader) and bulk queue (slow downloader)
//! - Staged-changes buffer attached to a transaction
//! - Deterministic coalescing of commands within one transaction
//! - Commit reports delivered to commit listeners
//!
//! Nothing here decides *whether* an identity should be watched. Callers stage
//! commands; the store only records them and applies them on commit.

pub mod table;
pub mod staged;
pub mod database;

pub use table::*;
pub use staged::*;
pub use database::*;
