//! Tracing setup for processes embedding the strata core.
//!
//! The library itself only emits `tracing` events; hosts install a
//! subscriber once, either directly or from the `[logging]` config section.
//! Later calls are no-ops because the global subscriber is set only once.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install an `EnvFilter` subscriber. `level` applies when `RUST_LOG` is
/// unset; `json` switches to newline-delimited JSON lines.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Initialise tracing from the `[logging]` config section.
///
/// An unparseable level falls back to `INFO`.
pub fn init_from_config(config: &LoggingConfig) {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    init_tracing(config.json, level);
}
