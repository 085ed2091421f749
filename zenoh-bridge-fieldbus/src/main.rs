//! Zenoh bridge for fieldbus attributes.
//!
//! Registers the configured attributes and serves reads, writes and
//! runtime registrations over Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use zenattr_common::{AttributeKeys, BridgeConfig, BridgeStatus, LoggingConfig};
use zenattr_core::AttributeBridge;
use zenoh_bridge_fieldbus::bus::FieldBus;
use zenoh_bridge_fieldbus::config::FieldbusBridgeConfig;
use zenoh_bridge_fieldbus::exposer::AttributeExposer;

const BRIDGE_NAME: &str = "fieldbus";

/// Zenoh bridge exposing fieldbus registers as attributes.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-fieldbus")]
#[command(about = "Exposes fieldbus registers as dynamically registered Zenoh attributes")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "fieldbus.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = FieldbusBridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging().level.clone()),
        format: config.logging().format,
    };
    zenattr_common::init_tracing(&log_config).context("Failed to init tracing")?;

    info!("Starting zenoh-bridge-fieldbus");
    info!("Loaded configuration from {:?}", args.config);

    // Connect to Zenoh
    info!("Connecting to Zenoh...");
    let session = zenattr_common::connect(config.zenoh())
        .await
        .context("Failed to connect to Zenoh")?;
    info!("Connected to Zenoh");

    let format = config.format();
    let keys = AttributeKeys::with_prefix(config.key_prefix(), &config.bridge.device);
    let status_key = keys.status_key();

    // Connect to the device; an unreachable bus is fatal
    let bus = match FieldBus::open(&config.bridge.bus).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            error!(
                bus = config.bridge.bus.kind(),
                "Failed to connect to fieldbus device: {}", e
            );
            let status = BridgeStatus::error(BRIDGE_NAME, env!("CARGO_PKG_VERSION"), e.to_string());
            if let Err(publish_err) = status.publish(&session, &status_key, format).await {
                error!("Failed to publish bridge status: {}", publish_err);
            }
            let _ = session.close().await;
            return Err(anyhow::Error::new(e).context("Failed to connect to fieldbus device"));
        }
    };
    info!(bus = config.bridge.bus.kind(), "Connected to fieldbus device");

    // Register startup attributes
    let bridge = AttributeBridge::new(bus);

    let startup_error = match bridge.register_records(config.bridge.attributes.clone()) {
        Ok(count) => {
            info!(count, "Registered startup attributes");
            None
        }
        Err(e) => {
            error!(
                index = e.index,
                attribute = %e.name,
                registered = e.registered,
                "Startup registration stopped: {}",
                e
            );
            Some(e.to_string())
        }
    };

    let exposer = AttributeExposer::declare(&session, bridge.clone(), keys.clone(), format)
        .await
        .context("Failed to declare queryables")?;
    let task = tokio::spawn(exposer.run());

    info!(
        device = %config.bridge.device,
        bus = config.bridge.bus.kind(),
        attributes = bridge.registry().len(),
        "Fieldbus bridge running"
    );

    // Publish bridge status
    let metadata = serde_json::json!({
        "device": config.bridge.device,
        "bus": config.bridge.bus.kind(),
        "attributes": bridge.registry().names(),
    });
    let status = match &startup_error {
        None => BridgeStatus::running(BRIDGE_NAME, env!("CARGO_PKG_VERSION")),
        Some(message) => BridgeStatus::error(BRIDGE_NAME, env!("CARGO_PKG_VERSION"), message),
    }
    .with_metadata(metadata);

    if let Err(e) = status.publish(&session, &status_key, format).await {
        error!("Failed to publish bridge status: {}", e);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    task.abort();

    // Publish offline status
    let status = BridgeStatus::offline(BRIDGE_NAME, env!("CARGO_PKG_VERSION"));
    let _ = status.publish(&session, &status_key, format).await;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Fieldbus bridge stopped");

    Ok(())
}
