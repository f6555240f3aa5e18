//! Tracing subscriber setup for hosts embedding the downloaders

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trustwatch_core::{WatchError, WatchResult};

use crate::WatchConfig;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_filter`. Fails instead of
/// panicking when a global subscriber is already installed.
pub fn init_logging(config: &WatchConfig, format: LogFormat) -> WatchResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| WatchError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    result.map_err(|e| WatchError::Logging(e.to_string()))
}
