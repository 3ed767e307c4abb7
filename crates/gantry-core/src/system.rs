//! Process-wide settings passed explicitly to scheduling and execution.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Exposed to jobs as `GO_SERVER_URL` when set.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Root under which each pipeline gets its working directory.
    #[serde(default = "default_pipelines_dir")]
    pub pipelines_dir: PathBuf,
    #[serde(default = "default_console_publish_interval_ms")]
    pub console_publish_interval_ms: u64,
}

fn default_pipelines_dir() -> PathBuf {
    PathBuf::from("pipelines")
}

fn default_console_publish_interval_ms() -> u64 {
    10_000
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            pipelines_dir: default_pipelines_dir(),
            console_publish_interval_ms: default_console_publish_interval_ms(),
        }
    }
}

impl SystemConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_pipelines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pipelines_dir = dir.into();
        self
    }

    pub fn with_console_publish_interval(mut self, interval: Duration) -> Self {
        self.console_publish_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn console_publish_interval(&self) -> Duration {
        Duration::from_millis(self.console_publish_interval_ms)
    }

    pub fn working_directory_for(&self, pipeline_name: &str) -> PathBuf {
        self.pipelines_dir.join(pipeline_name)
    }
}
