//! Collaborator interfaces consumed by the build executor.
//!
//! They are called from the agent's build thread and are therefore
//! synchronous.

use crate::Result;
use crate::builder::FetchSpec;
use crate::env::EnvironmentVariableContext;
use crate::plan::JobIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Line-oriented job console.
pub trait ConsoleOut: Send + Sync {
    fn consume_line(&self, line: &str);

    /// Writes an agent-originated message.
    fn print_go(&self, message: &str) {
        self.consume_line(&format!("[go] {}", message));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Server-side artifact and property store.
pub trait ArtifactSink: Send + Sync {
    /// Uploads a file or a whole directory to `dest_path` under the job's
    /// artifact root.
    fn publish(
        &self,
        console: &dyn ConsoleOut,
        dest_path: &str,
        source: &Path,
        job: &JobIdentifier,
    ) -> Result<()>;

    /// Downloads an upstream artifact into `dest`.
    fn fetch(&self, console: &dyn ConsoleOut, spec: &FetchSpec, dest: &Path) -> Result<()>;

    fn set_property(&self, job: &JobIdentifier, property: &Property) -> Result<()>;
}

/// Ships buffered console output to the server.
pub trait ConsoleUploader: Send + Sync {
    fn upload(&self, job: &JobIdentifier, content: &str) -> Result<()>;
}

pub struct TaskRequest<'a> {
    pub working_dir: &'a Path,
    pub environment: &'a EnvironmentVariableContext,
    pub configuration: &'a BTreeMap<String, String>,
    pub console: &'a dyn ConsoleOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Opaque task plugin invocation.
pub trait TaskExtension: Send + Sync {
    fn execute(&self, plugin_id: &str, request: &TaskRequest<'_>) -> Result<TaskResponse>;
}
