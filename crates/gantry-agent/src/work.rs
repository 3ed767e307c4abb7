//! Units of work handed out by the server, one poll at a time.

use crate::build_work::BuildWork;
use crate::remote::BuildRepositoryRemote;
use gantry_core::agent::AgentRuntimeInfo;
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::ports::{ArtifactSink, ConsoleUploader, TaskExtension};
use gantry_core::{Error, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runtime info shared between the controller and the build thread.
pub type SharedRuntimeInfo = Arc<Mutex<AgentRuntimeInfo>>;

/// Collaborators a unit of work runs against.
#[derive(Clone)]
pub struct WorkContext {
    pub remote: Arc<dyn BuildRepositoryRemote>,
    pub artifacts: Arc<dyn ArtifactSink>,
    pub console: Arc<dyn ConsoleUploader>,
    pub tasks: Option<Arc<dyn TaskExtension>>,
    pub runtime: SharedRuntimeInfo,
    /// Root for relative job working directories.
    pub work_dir: PathBuf,
    pub console_publish_interval: Duration,
    /// Environment the agent process itself runs with.
    pub ambient: EnvironmentVariableContext,
}

impl WorkContext {
    /// Snapshot of the runtime info for protocol calls.
    pub fn runtime_info(&self) -> AgentRuntimeInfo {
        self.runtime.lock().clone()
    }
}

#[derive(Debug, Clone)]
pub enum Work {
    NoWork,
    BuildWork(Arc<BuildWork>),
    DeniedAgentWork,
    UnregisteredAgentWork { message: String },
}

impl Work {
    pub fn do_work(&self, ctx: &WorkContext) -> Result<()> {
        match self {
            Work::NoWork => {
                debug!("No work");
                Ok(())
            }
            Work::BuildWork(build) => build.do_work(ctx).map(|_| ()),
            Work::DeniedAgentWork => {
                warn!(agent_uuid = %ctx.runtime.lock().uuid(), "Agent is denied by the server");
                Ok(())
            }
            Work::UnregisteredAgentWork { message } => Err(Error::AgentUnregistered(message.clone())),
        }
    }

    pub fn cancel(&self, ctx: &WorkContext) {
        if let Work::BuildWork(build) = self {
            build.cancel(&ctx.runtime);
        }
    }

    pub fn is_build(&self) -> bool {
        matches!(self, Work::BuildWork(_))
    }

    pub fn description(&self) -> String {
        match self {
            Work::NoWork => "NoWork".to_string(),
            Work::BuildWork(build) => format!("BuildWork[{}]", build.assignment().job_identifier()),
            Work::DeniedAgentWork => "DeniedAgentWork".to_string(),
            Work::UnregisteredAgentWork { .. } => "UnregisteredAgentWork".to_string(),
        }
    }
}
