//! Market depth fan-out service binary
//!
//! Wires the pipeline to the in-process bus, installs the shutdown signal
//! handler and runs until stopped or the configured runtime cap elapses.

use anyhow::Result;
use market_depth::{MemoryBus, Pipeline, ServiceConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "market-depth";
const DEFAULT_CONFIG_PATH: &str = "config/market_depth";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("MARKET_DEPTH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = ServiceConfig::from_file(&config_path)?;
    let max_runtime_seconds = config.processor.max_runtime_seconds;

    let bus = Arc::new(MemoryBus::new(config.processor.bus_capacity));
    let pipeline = Arc::new(Pipeline::new(config, bus)?);
    pipeline.initialise()?;

    let signal_target = Arc::clone(&pipeline);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_target.stop();
        }
    });

    pipeline.run(max_runtime_seconds).await?;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", SERVICE_NAME.replace('-', "_")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();
}
