//! Structured logging setup.
//!
//! Everything in the crate logs through `tracing` with structured fields
//! (`task_id`, `backend`, `native_id`, `attempt`). Binaries call
//! `init_logging` once; libraries embedding the router can install their own
//! subscriber instead.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// `SWITCHYARD_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env("SWITCHYARD_LOG")
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        // Another subscriber may already be installed (tests, embedding apps).
        let result = if config.json {
            registry
                .with(fmt::layer().json().with_target(true))
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_thread_ids(true))
                .try_init()
        };
        if result.is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        }
    });
}
