//! CMT configuration: the shared core settings plus a `[cmt]` section
//! listing the monitored filesystems.

use crate::monitor::MAX_DISKS;
use comptask_core::CoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const PROCESS_NAME: &str = "CM0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CmtConfigError {
    #[error("{0} disks configured, at most 4 are monitored")]
    TooManyDisks(usize),
    #[error("warn_percent {value} for {} is not a percentage", .path.display())]
    WarnPercent { path: PathBuf, value: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmtConfig {
    #[serde(flatten)]
    pub core: CoreConfig,
    #[serde(default)]
    pub cmt: CmtSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmtSection {
    pub disks: Vec<DiskConfig>,
    pub ntp_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Mount point, as listed by the OS.
    pub path: PathBuf,
    /// Warn when free space drops below this many percent.
    pub warn_percent: u32,
}

impl Default for CmtSection {
    fn default() -> Self {
        Self {
            disks: vec![DiskConfig {
                path: PathBuf::from("/"),
                warn_percent: 10,
            }],
            ntp_check: true,
        }
    }
}

impl CmtSection {
    pub fn validate(&self) -> Result<(), CmtConfigError> {
        if self.disks.len() > MAX_DISKS {
            return Err(CmtConfigError::TooManyDisks(self.disks.len()));
        }
        if let Some(disk) = self.disks.iter().find(|d| d.warn_percent > 100) {
            return Err(CmtConfigError::WarnPercent {
                path: disk.path.clone(),
                value: disk.warn_percent,
            });
        }
        Ok(())
    }
}

impl Default for CmtConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::for_process(PROCESS_NAME),
            cmt: CmtSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptask_core::config::load_config_from;

    #[tokio::test]
    async fn test_load_disks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CM0.toml");
        std::fs::write(
            &path,
            r#"
[process]
name = "CM0"

[cmt]
ntp_check = false

[[cmt.disks]]
path = "/"
warn_percent = 5

[[cmt.disks]]
path = "/data"
warn_percent = 20
"#,
        )
        .unwrap();

        let config: CmtConfig = load_config_from(&path).await.unwrap();
        assert!(!config.cmt.ntp_check);
        assert_eq!(config.cmt.disks.len(), 2);
        assert_eq!(config.cmt.disks[1].path, PathBuf::from("/data"));
        assert_eq!(config.cmt.disks[1].warn_percent, 20);
        assert!(config.cmt.validate().is_ok());
        assert_eq!(config.core.resolve().unwrap().own.0, 137);
    }

    #[test]
    fn test_validation() {
        let disk = |warn_percent| DiskConfig {
            path: PathBuf::from("/"),
            warn_percent,
        };
        let mut section = CmtSection {
            disks: vec![disk(10); 5],
            ntp_check: true,
        };
        assert_eq!(section.validate(), Err(CmtConfigError::TooManyDisks(5)));

        section.disks = vec![disk(10), disk(101)];
        assert!(matches!(section.validate(), Err(CmtConfigError::WarnPercent { value: 101, .. })));

        assert!(CmtSection::default().validate().is_ok());
    }
}
