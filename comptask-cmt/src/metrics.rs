//! Host resource sampling for the CMT
//!
//! Provides:
//! - CPU usage, free memory and free disk space in milli-percent
//! - Motherboard temperatures in milli-degrees Celsius
//! - NTP synchronisation state (Linux `timedatectl`)

use comptask_core::ProducerError;
use std::path::Path;
use std::process::Command;
use sysinfo::{Components, Disks, System};
use tracing::debug;

/// Source of the readings behind the CMT query datums.
pub trait HostProbe {
    fn cpu_used(&mut self) -> Result<i32, ProducerError>;
    fn memory_free(&mut self) -> Result<i32, ProducerError>;
    fn disk_free(&mut self, mount_point: &Path) -> Result<i32, ProducerError>;
    /// Temperature of the `index`-th sensor, in enumeration order.
    fn temperature(&mut self, index: usize) -> Result<i32, ProducerError>;
    fn ntp_locked(&mut self) -> Result<bool, ProducerError>;
}

/// `part / total` scaled to milli-percent (100% = 100000).
pub fn milli_percent(part: u64, total: u64) -> Option<i32> {
    if total == 0 {
        return None;
    }
    let scaled = (part as u128 * 100_000) / total as u128;
    i32::try_from(scaled).ok()
}

/// Interprets `timedatectl show -p NTPSynchronized --value`.
pub fn parse_ntp_synchronized(output: &str) -> Option<bool> {
    match output.trim() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    components: Components,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // First CPU reading is relative to this refresh.
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn cpu_used(&mut self) -> Result<i32, ProducerError> {
        self.system.refresh_cpu_usage();
        let percent = self.system.global_cpu_info().cpu_usage();
        Ok((percent * 1_000.0).round() as i32)
    }

    fn memory_free(&mut self) -> Result<i32, ProducerError> {
        self.system.refresh_memory();
        milli_percent(self.system.available_memory(), self.system.total_memory())
            .ok_or(ProducerError::Unsupported)
    }

    fn disk_free(&mut self, mount_point: &Path) -> Result<i32, ProducerError> {
        self.disks.refresh_list();
        let disk = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == mount_point)
            .ok_or_else(|| ProducerError::Failed(format!("nothing mounted at {}", mount_point.display())))?;
        milli_percent(disk.available_space(), disk.total_space())
            .ok_or_else(|| ProducerError::Failed(format!("{} reports no capacity", mount_point.display())))
    }

    fn temperature(&mut self, index: usize) -> Result<i32, ProducerError> {
        self.components.refresh();
        let component = self.components.list().get(index).ok_or(ProducerError::Unsupported)?;
        let celsius = component.temperature();
        if !celsius.is_finite() {
            return Err(ProducerError::Failed(format!("{} returned no reading", component.label())));
        }
        Ok((celsius * 1_000.0).round() as i32)
    }

    fn ntp_locked(&mut self) -> Result<bool, ProducerError> {
        if !cfg!(target_os = "linux") {
            return Err(ProducerError::Unsupported);
        }
        let output = Command::new("timedatectl")
            .args(["show", "-p", "NTPSynchronized", "--value"])
            .output()
            .map_err(|e| ProducerError::Failed(format!("timedatectl: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("timedatectl NTPSynchronized={}", stdout.trim());
        parse_ntp_synchronized(&stdout)
            .ok_or_else(|| ProducerError::Failed(format!("unexpected timedatectl output '{}'", stdout.trim())))
    }
}
