//! Logging bootstrap (§6 "process bootstrap", ambient stack).

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global tracing subscriber. `RUST_LOG` always takes
/// precedence over the configured `level` when set.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = if config.format == "json" {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer().json()).try_init()
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).try_init()
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}
