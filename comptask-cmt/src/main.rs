//! Comptask CMT - Computer Monitor Task
//!
//! Samples the host on every heartbeat and reports to the status database:
//! - CPU usage, free memory and free space on up to four filesystems
//! - Motherboard temperatures where the OS exposes them
//! - NTP lock, with WARN state while unlocked or while a disk is low

mod config;
mod datums;
mod metrics;
mod monitor;

use anyhow::{Context, Result};
use comptask_core::{
    load_config, new_shared, version_milli, Exit, MqttTransport, Package, ProcessCore, ProcessIdentity,
    SystemClock,
};
use config::{CmtConfig, PROCESS_NAME};
use metrics::SysinfoProbe;
use monitor::HealthFlags;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("comptask_cmt=info,comptask_core=info")),
        )
        .init();

    let config: CmtConfig = load_config(PROCESS_NAME)
        .await
        .context("Failed to load configuration")?;
    config.cmt.validate().context("Invalid [cmt] section")?;
    let resolved = config.core.resolve().context("Invalid endpoint configuration")?;
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(
        "Starting {} (CMT v{}) on {}, monitoring {} disk(s)",
        resolved.name,
        env!("CARGO_PKG_VERSION"),
        host,
        config.cmt.disks.len()
    );

    let flags = new_shared(HealthFlags::default());
    let probe = new_shared(SysinfoProbe::new());
    let registry =
        datums::build_registry(&config.cmt, probe, flags.clone()).context("Failed to build parameter table")?;
    let transport = MqttTransport::connect(&config.core, &resolved)
        .await
        .context("Failed to connect to MQTT broker")?;

    let identity = ProcessIdentity {
        package: Package::CMT,
        version_milli: version_milli(env!("CARGO_PKG_VERSION")),
    };
    let mut core = ProcessCore::new(resolved, identity, registry, transport, SystemClock)
        .with_state_rule(monitor::state_rule(flags));
    core.start().await.context("Startup failed")?;

    match core.run().await {
        Exit::Shutdown => {
            info!("CMT stopped");
            Ok(())
        }
        Exit::Failed => {
            error!("CMT terminated in FAILED state");
            std::process::exit(1);
        }
    }
}
