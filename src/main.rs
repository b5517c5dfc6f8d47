//! Topograph Binary Entry Point
//!
//! This binary runs the complete collection loop against a simulated
//! device fleet. Core functionality is provided by the `topograph`
//! library crate.

use std::sync::Arc;

use clap::Parser;
use topograph::{
    analyze::MemoryGraph,
    config::AppConfig,
    plugin::PluginStore,
    poller::Poller,
    protocol::sim::FleetTransport,
    registry::FileRegistry,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Topograph - Network Topology Collector
#[derive(Parser, Debug)]
#[command(name = "topograph", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "TOPOGRAPH_CONFIG"
    )]
    config: String,

    /// Path to a fleet fixture (overrides config file)
    #[arg(long, env = "TOPOGRAPH_FLEET")]
    fleet: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,topograph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Topograph - Network Topology Collector");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(fleet) = cli.fleet {
        config.fleet = Some(fleet);
    }

    let registry = FileRegistry::load(&config.registry.dir)?;
    tracing::info!(
        modules = registry.module_count(),
        "Symbol registry loaded from: {}",
        config.registry.dir
    );

    let plugins = PluginStore::load(&config.plugins.dir, &config.plugins.default)?;
    tracing::info!("Plugin documents loaded from: {}", config.plugins.dir);

    let fleet_path = config
        .fleet
        .clone()
        .ok_or("no fleet fixture configured (set `fleet:` or --fleet)")?;
    let transport = FleetTransport::load(&fleet_path)?;
    tracing::info!(
        devices = transport.device_count(),
        "Fleet fixture loaded from: {}",
        fleet_path
    );

    let graph = Arc::new(MemoryGraph::new());
    let poller = Poller::new(
        config,
        plugins,
        Arc::new(registry),
        Arc::new(transport),
        graph.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Press Ctrl+C to shutdown");
    poller.run(shutdown_rx).await;

    tracing::info!(
        devices = graph.device_count(),
        links = graph.link_count(),
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for a termination signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
