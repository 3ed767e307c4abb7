//! Agent configuration.

use gantry_core::AgentUuid;
use gantry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the server, e.g. `https://ci.example.com/go`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Stable identity; generated when the file does not carry one.
    #[serde(default = "AgentUuid::generate")]
    pub uuid: AgentUuid,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Resources advertised for job matching.
    #[serde(default)]
    pub resources: Vec<String>,
    /// Root that relative job working directories resolve against.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_work_interval")]
    pub work_interval_secs: u64,
    #[serde(default = "default_console_interval")]
    pub console_publish_interval_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:8153/go".to_string()
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/var/lib/gantry-agent")
}

fn default_ping_interval() -> u64 {
    5
}

fn default_work_interval() -> u64 {
    5
}

fn default_console_interval() -> u64 {
    10_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            uuid: AgentUuid::generate(),
            hostname: default_hostname(),
            resources: vec![],
            work_dir: default_work_dir(),
            ping_interval_secs: default_ping_interval(),
            work_interval_secs: default_work_interval(),
            console_publish_interval_ms: default_console_interval(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.server_url()?;
        Ok(config)
    }

    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("Invalid server_url '{}': {}", self.server_url, e)))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn work_interval(&self) -> Duration {
        Duration::from_secs(self.work_interval_secs)
    }

    pub fn console_publish_interval(&self) -> Duration {
        Duration::from_millis(self.console_publish_interval_ms)
    }
}
