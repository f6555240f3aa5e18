//! Trustwatch Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every trustwatch layer:
//! - Identifiers (IdentityId, Edition, ClientId)
//! - Trust graph facts (Trust, Score, Rank)
//! - Edition hints observed while polling
//! - Request priority classes
//! - The rank oracle consumed from the trust graph

pub mod id;
pub mod trust;
pub mod hint;
pub mod priority;
pub mod oracle;
pub mod error;

pub use id::*;
pub use trust::*;
pub use hint::*;
pub use priority::*;
pub use oracle::*;
pub use error::*;
