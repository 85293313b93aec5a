//! CCT configuration: the shared core settings plus a `[cct]` section.

use comptask_core::CoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Endpoint name the CCT uses when no configuration says otherwise.
pub const PROCESS_NAME: &str = "CC0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CctConfig {
    #[serde(flatten)]
    pub core: CoreConfig,
    #[serde(default)]
    pub cct: CctSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CctSection {
    /// One command per line, launched in order on `DMD_APP_START`.
    pub app_start_file: Option<PathBuf>,
    /// Commands run on `DMD_APP_KILL` instead of killing the launched pids.
    pub app_shutdown_file: Option<PathBuf>,
    pub exec_delay_ms: u64,
    pub restart_command: String,
    pub close_command: String,
}

impl Default for CctSection {
    fn default() -> Self {
        Self {
            app_start_file: None,
            app_shutdown_file: None,
            exec_delay_ms: 1_000,
            restart_command: "/sbin/shutdown -r now".to_string(),
            close_command: "/sbin/shutdown -h now".to_string(),
        }
    }
}

impl Default for CctConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::for_process(PROCESS_NAME),
            cct: CctSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptask_core::config::load_config_from;

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CC0.toml");
        std::fs::write(
            &path,
            r#"
[process]
name = "CC0"

[cct]
app_start_file = "/opt/app/start.cfg"
exec_delay_ms = 250
"#,
        )
        .unwrap();

        let config: CctConfig = load_config_from(&path).await.unwrap();
        assert_eq!(config.cct.app_start_file, Some(PathBuf::from("/opt/app/start.cfg")));
        assert_eq!(config.cct.exec_delay_ms, 250);
        assert_eq!(config.cct.close_command, "/sbin/shutdown -h now");
        assert!(config.cct.app_shutdown_file.is_none());
        assert_eq!(config.core.mqtt.topic_prefix, "comptask/cil");
        assert_eq!(config.core.resolve().unwrap().own.0, 147);
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = toml::to_string_pretty(&CctConfig::default()).unwrap();
        let parsed: CctConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.core.process.name, PROCESS_NAME);
        assert_eq!(parsed.cct.exec_delay_ms, 1_000);
    }
}
