//! Configuration shared by every computer task.
//!
//! Handles:
//! - MQTT broker settings
//! - Endpoint map (process name to numeric address)
//! - Roles (which endpoint sends heartbeats, which one is the database...)
//! - Heartbeat and receive timing

use crate::message::EndpointId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "COMPTASK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find a config directory")]
    NoConfigDir,
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("role '{role}' names unknown endpoint '{name}'")]
    UnknownEndpoint { role: &'static str, name: String },
    #[error("endpoint id {0} is assigned twice")]
    DuplicateId(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub process: ProcessConfig,
    pub mqtt: MqttConfig,
    pub endpoints: BTreeMap<String, u32>,
    pub roles: RolesConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Own endpoint name, looked up in `endpoints`.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    pub heartbeat: String,
    pub supervisor: String,
    pub database: String,
    pub relay: String,
    pub direct_control: String,
    pub controllers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub heartbeat_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let endpoints = [
            ("MCP", 1),
            ("CHB", 2),
            ("MCB", 9),
            ("SDB", 10),
            ("TST", 125),
            ("CM0", 137),
            ("CC0", 147),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_string(), id))
        .collect();

        Self {
            process: ProcessConfig { name: "CC0".to_string() },
            mqtt: MqttConfig {
                broker_host: "127.0.0.1".to_string(),
                broker_port: 1883,
                client_id: None,
                keep_alive_secs: 30,
                topic_prefix: "comptask/cil".to_string(),
            },
            endpoints,
            roles: RolesConfig {
                heartbeat: "CHB".to_string(),
                supervisor: "MCP".to_string(),
                database: "SDB".to_string(),
                relay: "MCB".to_string(),
                direct_control: "MCP".to_string(),
                controllers: vec!["MCP".to_string(), "TST".to_string()],
            },
            timing: TimingConfig {
                heartbeat_timeout_ms: 3_000,
                receive_timeout_ms: 100,
            },
        }
    }
}

/// Bidirectional name/address lookup.
#[derive(Debug, Clone, Default)]
pub struct EndpointMap {
    by_name: BTreeMap<String, EndpointId>,
    by_id: HashMap<EndpointId, String>,
}

impl EndpointMap {
    pub fn new(entries: &BTreeMap<String, u32>) -> Result<Self, ConfigError> {
        let mut map = Self::default();
        for (name, &id) in entries {
            let id = EndpointId(id);
            if map.by_id.insert(id, name.clone()).is_some() {
                return Err(ConfigError::DuplicateId(id.0));
            }
            map.by_name.insert(name.clone(), id);
        }
        Ok(map)
    }

    pub fn id_of(&self, name: &str) -> Option<EndpointId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: EndpointId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roles {
    pub heartbeat: EndpointId,
    pub supervisor: EndpointId,
    pub database: EndpointId,
    pub relay: EndpointId,
    pub direct_control: EndpointId,
    pub controllers: Vec<EndpointId>,
}

/// Configuration with every name turned into an address.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub name: String,
    pub own: EndpointId,
    pub endpoints: EndpointMap,
    pub roles: Roles,
    pub heartbeat_timeout: Duration,
    pub receive_timeout: Duration,
}

impl CoreConfig {
    /// Default configuration for the process called `name`.
    pub fn for_process(name: &str) -> Self {
        let mut config = Self::default();
        config.process.name = name.to_string();
        config
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let endpoints = EndpointMap::new(&self.endpoints)?;
        let lookup = |role: &'static str, name: &str| {
            endpoints.id_of(name).ok_or_else(|| ConfigError::UnknownEndpoint {
                role,
                name: name.to_string(),
            })
        };

        let roles = Roles {
            heartbeat: lookup("heartbeat", &self.roles.heartbeat)?,
            supervisor: lookup("supervisor", &self.roles.supervisor)?,
            database: lookup("database", &self.roles.database)?,
            relay: lookup("relay", &self.roles.relay)?,
            direct_control: lookup("direct_control", &self.roles.direct_control)?,
            controllers: self
                .roles
                .controllers
                .iter()
                .map(|name| lookup("controllers", name))
                .collect::<Result<_, _>>()?,
        };
        let own = lookup("process", &self.process.name)?;

        Ok(ResolvedConfig {
            name: self.process.name.clone(),
            own,
            endpoints,
            roles,
            heartbeat_timeout: Duration::from_millis(self.timing.heartbeat_timeout_ms),
            receive_timeout: Duration::from_millis(self.timing.receive_timeout_ms),
        })
    }
}

/// OS-specific default location: `<config dir>/comptask/<process>.toml`.
pub fn config_file_path(process: &str) -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push("comptask");
    path.push(format!("{}.toml", process));
    Ok(path)
}

/// Loads a TOML configuration from `path`, or defaults if it does not exist.
pub async fn load_config_from<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        info!("No configuration at {}, using defaults", path.display());
        return Ok(T::default());
    }
    let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded configuration from {}", path.display());
    Ok(toml::from_str(&content)?)
}

/// Loads the configuration named by `COMPTASK_CONFIG`, falling back to the
/// per-process default location.
pub async fn load_config<T>(process: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => config_file_path(process)?,
    };
    load_config_from(&path).await
}
