//! Trustwatch Runtime - Identity download coordination
//!
//! This crate decides which identities of the trust graph are polled
//! continuously and keeps that decision in step with committed scores:
//! 1. Evaluate eligibility (any score with rank <= 1)
//! 2. Stage start/abort/hint commands into the ambient transaction
//! 3. On commit, subscribe/unsubscribe and schedule payload fetches
//! 4. Resync the whole watch set on every start
//!
//! Two downloader variants share one request client: the fast downloader
//! polls eligible identities; the slow downloader covers everyone else and
//! only fetches when hinted. The controller picks the variant per identity.

pub mod config;
pub mod logging;
pub mod eligibility;
pub mod context;
pub mod downloader;
pub mod daemon;
pub mod fast;
pub mod slow;
pub mod controller;

pub use config::*;
pub use logging::*;
pub use eligibility::*;
pub use context::*;
pub use downloader::*;
pub use daemon::*;
pub use fast::*;
pub use slow::*;
pub use controller::*;

#[cfg(test)]
pub(crate) mod testing;
