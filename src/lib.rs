//! Huddle - Room Chat and Call Signaling Relay
//!
//! Huddle keeps named chat rooms, fans chat lines out to every member of a
//! room, tells lobby listeners when rooms come and go, and relays WebRTC
//! signaling between the two peers of a room's call. Empty rooms are deleted
//! after a grace period. No media flows through the server.
#![warn(missing_docs)]

// Core foundational modules
pub mod constants;
pub mod core;

// Connection plumbing
pub mod connection;
pub mod protocol;
pub mod router;

// Registries
pub mod calls;
pub mod lobby;
pub mod rooms;

// Outer surface
pub mod api;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{AppState, Config, Error, Result};

use crate::core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless; later calls keep the first subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Initialize tracing and metrics for a server process
pub fn init(config: &Config) {
    init_tracing(&config.logging);
    tracing::info!("Initializing {} v{}", NAME, VERSION);

    if config.metrics.enabled {
        system::metrics::init_registry();
    }
}
