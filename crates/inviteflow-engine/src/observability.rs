//! Tracing setup for hosts that embed the engine.
//!
//! The engine itself only emits `tracing` events; installing a subscriber
//! is left to the host. These helpers install the usual `fmt` subscriber
//! with a level filter that can be swapped at runtime.

use crate::config::LoggingConfig;
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_from_config(&LoggingConfig::default());
}

pub fn init_tracing_from_config(logging: &LoggingConfig) {
    init_tracing_with_level(&logging.level);
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| level_filter(level).unwrap_or_else(|_| EnvFilter::new("info")));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    if LOG_RELOAD_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Parses a level or directive string such as `debug` or
/// `inviteflow_engine=trace,info`.
pub fn level_filter(level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(level).map_err(|e| format!("invalid log filter '{level}': {e}"))
}

/// Swaps the active level filter. Returns `false` when tracing was not
/// initialized through this module or the filter does not parse.
pub fn apply_logging_level(level: &str) -> bool {
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    let Ok(filter) = level_filter(level) else {
        tracing::warn!(level, "ignoring invalid logging level");
        return false;
    };
    handle.modify(|f| *f = filter).is_ok()
}
