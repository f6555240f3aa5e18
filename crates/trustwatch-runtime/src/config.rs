//! Downloader configuration

use serde::Deserialize;
use trustwatch_core::{
    Rank, WatchError, WatchResult, DEFAULT_DIRECT_TRUST_THRESHOLD, MAX_TRUST_VALUE,
};

/// Trustwatch configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Trust values at or above this make the trustee directly trusted.
    /// Applied by the trust graph when it derives rank-1 scores. Never negative.
    pub direct_trust_threshold: i8,
    /// Highest rank the fast downloader watches
    pub max_watch_rank: u32,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            direct_trust_threshold: DEFAULT_DIRECT_TRUST_THRESHOLD,
            max_watch_rank: Rank::DIRECT.0,
            log_filter: "info".to_string(),
        }
    }
}

impl WatchConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> WatchResult<Self> {
        let config: WatchConfig =
            serde_json::from_str(json).map_err(|e| WatchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the downloaders cannot honor
    pub fn validate(&self) -> WatchResult<()> {
        if self.max_watch_rank > Rank::DIRECT.0 {
            return Err(WatchError::InvalidConfig(format!(
                "max_watch_rank {} exceeds direct trust; indirect identities belong to the bulk downloader",
                self.max_watch_rank
            )));
        }
        // Distrust never counts as direct trust
        if !(0..=MAX_TRUST_VALUE).contains(&self.direct_trust_threshold) {
            return Err(WatchError::InvalidConfig(format!(
                "direct_trust_threshold {} outside 0..={}",
                self.direct_trust_threshold, MAX_TRUST_VALUE
            )));
        }
        if self.log_filter.trim().is_empty() {
            return Err(WatchError::InvalidConfig("log_filter is empty".to_string()));
        }
        Ok(())
    }

    pub fn max_watch_rank(&self) -> Rank {
        Rank::new(self.max_watch_rank)
    }
}
