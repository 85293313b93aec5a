//! Comptask CCT - Computer Control Task
//!
//! Lets the control system drive a computer over the supervised network:
//! - Reports OS availability and whether the application is running
//! - Starts the application from a command file, or kills it
//! - Restarts or closes the operating system on demand
//! - Answers heartbeats and safe-state commands from the supervisor

mod config;
mod datums;
mod execution;

use anyhow::{Context, Result};
use comptask_core::{
    load_config, new_shared, version_milli, Exit, MqttTransport, Package, ProcessCore, ProcessIdentity,
    SystemClock,
};
use config::{CctConfig, PROCESS_NAME};
use execution::AppLauncher;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("comptask_cct=info,comptask_core=info")),
        )
        .init();

    let config: CctConfig = load_config(PROCESS_NAME)
        .await
        .context("Failed to load configuration")?;
    let resolved = config.core.resolve().context("Invalid endpoint configuration")?;
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(
        "Starting {} (CCT v{}) on {}",
        resolved.name,
        env!("CARGO_PKG_VERSION"),
        host
    );

    let launcher = AppLauncher::new(new_shared(Vec::new()), Duration::from_millis(config.cct.exec_delay_ms));
    let registry = datums::build_registry(&config.cct, launcher).context("Failed to build parameter table")?;
    let transport = MqttTransport::connect(&config.core, &resolved)
        .await
        .context("Failed to connect to MQTT broker")?;

    let identity = ProcessIdentity {
        package: Package::CCT,
        version_milli: version_milli(env!("CARGO_PKG_VERSION")),
    };
    let mut core =
        ProcessCore::new(resolved, identity, registry, transport, SystemClock).with_state_rule(datums::state_rule);
    core.start().await.context("Startup failed")?;

    match core.run().await {
        Exit::Shutdown => {
            info!("CCT stopped");
            Ok(())
        }
        Exit::Failed => {
            error!("CCT terminated in FAILED state");
            std::process::exit(1);
        }
    }
}
