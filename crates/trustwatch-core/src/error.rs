//! Error types for trustwatch

use thiserror::Error;

use crate::IdentityId;

/// Core trustwatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    // Caller errors
    #[error("No such identity: {0}")]
    NoSuchIdentity(IdentityId),

    #[error("Invalid trust value: {0} (expected -100..=100)")]
    InvalidTrustValue(i16),

    // Lifecycle errors
    #[error("Request channel closed")]
    ChannelClosed,

    // Setup errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for trustwatch operations
pub type WatchResult<T> = Result<T, WatchError>;
