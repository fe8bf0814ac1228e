//! Tracing subscriber setup.
//!
//! The filter comes from `SNAPCACHE_LOG`, then `RUST_LOG`, then the
//! configured level. Output is plain text unless `logging.json` is set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SNAPCACHE_LOG";

/// Build the env filter for `config`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let registry = Registry::default().with(env_filter(config));
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }
    Ok(())
}
