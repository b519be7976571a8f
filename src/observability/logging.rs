//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once, in the host binary
//! - Pick the filter from `RUST_LOG`, falling back to the configured level
//! - Attach the log push layer when a push URL is configured
//!
//! # Design Decisions
//! - Human-readable `fmt` output on stdout
//! - The push level applies on top of the global filter, so it can only
//!   be stricter than local output

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;
use crate::observability::push::{self, LogShipper};

/// Install the global subscriber. Returns the shipper for the push layer,
/// if one was configured.
pub fn init(config: &ObservabilityConfig) -> Option<LogShipper> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let (layer, shipper) = match &config.push_url {
        Some(url) => {
            let level = Level::from_str(&config.push_level).unwrap_or(Level::WARN);
            let (layer, shipper) = push::channel(url.clone(), level, config.push_queue);
            (Some(layer), Some(shipper))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(layer)
        .try_init();

    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }

    shipper
}
