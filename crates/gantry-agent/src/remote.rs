//! The agent's view of the server.

use crate::build_work::BuildWork;
use crate::work::Work;
use gantry_core::Result;
use gantry_core::agent::AgentRuntimeInfo;
use gantry_core::assignment::BuildAssignment;
use gantry_core::job::{JobResult, JobState};
use gantry_core::plan::JobIdentifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the server wants the agent to do after a ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentInstruction {
    #[default]
    None,
    Cancel,
    Reregister,
}

/// Work as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum WorkPayload {
    NoWork,
    BuildWork { assignment: BuildAssignment },
    DeniedAgentWork,
    UnregisteredAgentWork { message: String },
}

impl From<WorkPayload> for Work {
    fn from(payload: WorkPayload) -> Self {
        match payload {
            WorkPayload::NoWork => Work::NoWork,
            WorkPayload::BuildWork { assignment } => Work::BuildWork(Arc::new(BuildWork::new(assignment))),
            WorkPayload::DeniedAgentWork => Work::DeniedAgentWork,
            WorkPayload::UnregisteredAgentWork { message } => Work::UnregisteredAgentWork { message },
        }
    }
}

/// Agent-to-server protocol. Calls block; the controller runs them off the
/// async runtime.
pub trait BuildRepositoryRemote: Send + Sync {
    fn ping(&self, info: &AgentRuntimeInfo) -> Result<AgentInstruction>;

    /// Registers the agent and returns the cookie identifying this session.
    fn get_cookie(&self, info: &AgentRuntimeInfo) -> Result<String>;

    fn get_work(&self, info: &AgentRuntimeInfo) -> Result<Work>;

    fn report_current_status(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, state: JobState) -> Result<()>;

    fn report_completing(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, result: JobResult) -> Result<()>;

    fn report_completed(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, result: JobResult) -> Result<()>;

    /// Whether the server no longer wants this job run.
    fn is_ignored(&self, job: &JobIdentifier) -> Result<bool>;
}
