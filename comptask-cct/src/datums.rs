//! CCT parameter table: query datums describing the host and the demand
//! datums that start/kill the application or power the machine down.

use crate::config::CctSection;
use crate::execution::{read_command_file, run_power_command, AppLauncher};
use comptask_core::{
    new_shared, Actuation, DatumId, DemandSpec, Package, ParameterRegistry, ProcessState, RegistryError,
    StatusCode, TaskError, Units,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

pub const QRY_OS_AVAILABLE: DatumId = DatumId(5);
pub const QRY_APP_PREPARED: DatumId = DatumId(6);
pub const QRY_APP_RUNNING: DatumId = DatumId(7);
pub const DMD_APP_START: DatumId = DatumId(8);
pub const DMD_APP_KILL: DatumId = DatumId(9);
pub const DMD_OS_RESTART: DatumId = DatumId(10);
pub const DMD_OS_CLOSE: DatumId = DatumId(11);

fn status(error: TaskError) -> StatusCode {
    StatusCode::task(Package::CCT, error)
}

fn flag(value: bool) -> i32 {
    i32::from(value)
}

fn start_application(launcher: &AppLauncher, file: Option<&PathBuf>) -> StatusCode {
    let Some(file) = file else {
        error!("No application start file configured");
        return status(TaskError::AppStart);
    };
    match read_command_file(file) {
        Ok(lines) => {
            info!(
                "Starting application from {} ({} command(s), {} pid(s) already tracked)",
                file.display(),
                lines.len(),
                launcher.pid_count()
            );
            launcher.spawn_launch(lines);
            StatusCode::NOMINAL
        }
        Err(e) => {
            error!("Unable to start application: {}", e);
            status(TaskError::AppStart)
        }
    }
}

fn kill_application(launcher: &AppLauncher, shutdown_file: Option<&PathBuf>) -> StatusCode {
    if let Some(file) = shutdown_file {
        // Shutdown commands are not tracked as application processes.
        let helpers = AppLauncher::new(new_shared(Vec::new()), Duration::ZERO);
        return match read_command_file(file) {
            Ok(lines) => {
                info!("Stopping application with {}", file.display());
                helpers.spawn_launch(lines);
                StatusCode::NOMINAL
            }
            Err(e) => {
                error!("Unable to stop application: {}", e);
                status(TaskError::AppKill)
            }
        };
    }
    match launcher.kill_all() {
        Ok(killed) => {
            info!("Application killed ({} process(es))", killed);
            StatusCode::NOMINAL
        }
        Err(_) => status(TaskError::AppKill),
    }
}

/// Reply first, then hand the machine over to the power command.
fn power_demand(label: &'static str, command: String) -> DemandSpec {
    DemandSpec::trigger(move |_| {
        let command = command.clone();
        Actuation::AfterReply(Box::new(move || {
            info!("Closing operating system ({})", label);
            match run_power_command(&command) {
                Ok(()) => StatusCode::NOMINAL,
                Err(e) => {
                    error!("Unable to close operating system ({}): {}", label, e);
                    status(TaskError::OsControl)
                }
            }
        }))
    })
}

pub fn build_registry(config: &CctSection, launcher: AppLauncher) -> Result<ParameterRegistry, RegistryError> {
    let mut registry = ParameterRegistry::new();

    // Answering at all means the OS is up and the host is prepared.
    registry.register_query(QRY_OS_AVAILABLE, Units::TrueFalse, || Ok(flag(true)))?;
    registry.register_query(QRY_APP_PREPARED, Units::TrueFalse, || Ok(flag(true)))?;
    let running = launcher.clone();
    registry.register_query(QRY_APP_RUNNING, Units::TrueFalse, move || Ok(flag(running.any_running())))?;

    let (starter, start_file) = (launcher.clone(), config.app_start_file.clone());
    registry.register_demand(
        DMD_APP_START,
        DemandSpec::trigger(move |_| Actuation::Complete(start_application(&starter, start_file.as_ref()))),
    )?;
    let shutdown_file = config.app_shutdown_file.clone();
    registry.register_demand(
        DMD_APP_KILL,
        DemandSpec::trigger(move |_| Actuation::Complete(kill_application(&launcher, shutdown_file.as_ref()))),
    )?;
    registry.register_demand(DMD_OS_RESTART, power_demand("restart", config.restart_command.clone()))?;
    registry.register_demand(DMD_OS_CLOSE, power_demand("close", config.close_command.clone()))?;

    Ok(registry)
}

/// Any heartbeat-driven sample leaves a running CCT OKAY.
pub fn state_rule(current: ProcessState) -> ProcessState {
    match current {
        ProcessState::Failed => current,
        _ => ProcessState::Okay,
    }
}
