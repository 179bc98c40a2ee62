//! meshbridge - Main Entry Point
//!
//! Loads the configuration, starts the bridge and runs until Ctrl-C.

use anyhow::Context;
use meshbridge::{
    config::{config_path, BridgeConfig},
    pipeline::PluginRegistry,
    transport::memory::MemoryTransport,
    Bridge,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,meshbridge=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting meshbridge");

    let path = config_path();
    let config = BridgeConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!(
        "Loaded {} device(s) and {} MQTT server(s) from {}",
        config.devices.len(),
        config.mqtt_servers.len(),
        path.display()
    );

    // No radio or MQTT driver is linked into this binary
    tracing::warn!("Using the in-memory transport; no traffic will reach real hardware");
    let transport = MemoryTransport::new();

    let bridge = Bridge::start(
        &config,
        PluginRegistry::with_builtins(),
        transport.devices(),
        transport.brokers(),
    )
    .context("Failed to start bridge")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to wait for Ctrl-C")?;

    tracing::info!("Ctrl-C received");
    bridge.shutdown();
    Ok(())
}
