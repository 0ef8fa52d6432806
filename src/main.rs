//! Huddle server
//!
//! Serves chat rooms, the lobby feed and call signaling over HTTP and
//! WebSocket on a single address.

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use huddle::core::config::parse_duration;
use huddle::{AppState, Config};
use std::path::Path;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("huddle")
        .version(huddle::VERSION)
        .about("Room chat and call signaling relay.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("http-addr")
                .long("http-addr")
                .value_name("ADDR")
                .help("HTTP and WebSocket bind address"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("expiry-grace")
                .long("expiry-grace")
                .value_name("DURATION")
                .help("How long an empty room survives, e.g. 60s or 5m"),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").map(Path::new);
    let mut config = Config::load(config_path).context("Failed to load configuration")?;

    // Apply CLI overrides
    apply_cli_overrides(&mut config, &matches)?;
    config.validate()?;

    huddle::init(&config);
    info!("Starting Huddle v{}", huddle::VERSION);
    info!(
        "Empty rooms expire after {:?}; keeping {} messages per room",
        config.rooms.expiry_grace, config.rooms.history_limit
    );

    let addr = config.server.http_addr;
    let state = AppState::new(config);

    huddle::api::start_server(addr, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(addr) = matches.get_one::<String>("http-addr") {
        config.server.http_addr = addr
            .parse()
            .with_context(|| format!("Invalid HTTP address: {}", addr))?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    if let Some(grace) = matches.get_one::<String>("expiry-grace") {
        config.rooms.expiry_grace = parse_duration(grace).map_err(anyhow::Error::msg)?;
    }

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
    warn!("Received shutdown signal, initiating graceful shutdown...");
}
