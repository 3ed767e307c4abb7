//! Error types for Gantry CD.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Cannot rerun job '{job_name}'. {information}")]
    CannotRerunJob {
        job_name: String,
        information: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("{0}")]
    IllegalArgument(String),

    // Resolution errors
    #[error("Could not find matching agents to run job [{job_name}] of stage [{stage_name}].")]
    NoMatchingAgents {
        job_name: String,
        stage_name: String,
    },

    // Execution errors
    #[error("The rule [{pattern}] does not match any resource under [{}]", .working_dir.display())]
    ArtifactNoMatch {
        pattern: String,
        working_dir: PathBuf,
    },

    #[error("Failed to upload [{0}]")]
    UploadFailed(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Plugin execution failed: {0}")]
    PluginExecutionFailed(String),

    #[error("Build cancelled")]
    Cancelled,

    // Protocol errors
    #[error("Agent denied: {0}")]
    AgentDenied(String),

    #[error("Agent is not registered: {0}")]
    AgentUnregistered(String),

    #[error("Network error: {0}")]
    Network(String),

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn cannot_rerun(job_name: impl Into<String>, information: impl Into<String>) -> Self {
        Error::CannotRerunJob {
            job_name: job_name.into(),
            information: information.into(),
        }
    }

    /// Errors a caller may safely retry on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
