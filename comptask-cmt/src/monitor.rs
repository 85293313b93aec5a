//! Warning conditions raised by the samples and the CMT state rule.

use comptask_core::{ProcessState, Shared};
use tracing::warn;

pub const MAX_DISKS: usize = 4;

#[derive(Debug, Default)]
pub struct HealthFlags {
    disk_warn: [bool; MAX_DISKS],
    ntp_warn: bool,
    /// Last NTP state written to the log, to report each transition once.
    ntp_reported: Option<bool>,
}

impl HealthFlags {
    /// Records a disk sample against its threshold (whole percent).
    pub fn record_disk(&mut self, index: usize, free_milli: i32, warn_percent: u32) {
        let Some(flag) = self.disk_warn.get_mut(index) else {
            return;
        };
        let low = i64::from(free_milli) < i64::from(warn_percent) * 1_000;
        if low && !*flag {
            warn!("Disk {} free space {}.{:03}% below {}%", index + 1, free_milli / 1_000, free_milli % 1_000, warn_percent);
        }
        *flag = low;
    }

    pub fn record_ntp(&mut self, locked: bool) {
        self.ntp_warn = !locked;
        if self.ntp_reported != Some(locked) {
            if locked {
                warn!("Ntp has become locked");
            } else {
                warn!("Ntp has become unlocked");
            }
            self.ntp_reported = Some(locked);
        }
    }

    pub fn disk_warning(&self) -> bool {
        self.disk_warn.iter().any(|&w| w)
    }

    pub fn ntp_warning(&self) -> bool {
        self.ntp_warn
    }

    pub fn any_warning(&self) -> bool {
        self.disk_warning() || self.ntp_warning()
    }
}

/// OKAY and WARN follow the warning flags; other states are left alone.
pub fn state_rule(flags: Shared<HealthFlags>) -> impl FnMut(ProcessState) -> ProcessState {
    move |current| match current {
        ProcessState::Okay | ProcessState::Warn if flags.lock().any_warning() => ProcessState::Warn,
        ProcessState::Okay | ProcessState::Warn => ProcessState::Okay,
        other => other,
    }
}
