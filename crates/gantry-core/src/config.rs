//! Static stage and job configuration, as read by the scheduler.

use crate::env::EnvironmentVariable;
use crate::job::JobResult;
use crate::plan::ArtifactPlan;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RunType {
    #[default]
    Simple,
    RunOnAllAgents,
    RunMultipleInstance { count: u32 },
}

impl RunType {
    pub fn is_run_on_all_agents(&self) -> bool {
        matches!(self, RunType::RunOnAllAgents)
    }

    pub fn is_run_multiple_instance(&self) -> bool {
        matches!(self, RunType::RunMultipleInstance { .. })
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunType::Simple => f.write_str("simple"),
            RunType::RunOnAllAgents => f.write_str("run on all agents"),
            RunType::RunMultipleInstance { .. } => f.write_str("run multiple instance"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[default]
    Success,
    Manual,
}

/// Condition under which a task runs, checked against the job result so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunIf {
    Passed,
    Failed,
    Any,
}

impl RunIf {
    pub fn matches(&self, result_so_far: JobResult) -> bool {
        match self {
            RunIf::Any => true,
            RunIf::Passed => result_so_far == JobResult::Passed,
            RunIf::Failed => result_so_far == JobResult::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TaskKind {
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<String>,
    },
    Fetch {
        /// Upstream pipeline; the current pipeline when absent.
        #[serde(default)]
        pipeline: Option<String>,
        stage: String,
        job: String,
        source: String,
        #[serde(default)]
        dest: Option<String>,
        #[serde(default)]
        is_file: bool,
    },
    Plugin {
        plugin_id: String,
        #[serde(default)]
        configuration: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default)]
    pub run_if: Vec<RunIf>,
    #[serde(default)]
    pub on_cancel: Option<Box<TaskConfig>>,
}

impl TaskConfig {
    pub fn exec(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            kind: TaskKind::Exec {
                command: command.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
                working_dir: None,
            },
            run_if: vec![],
            on_cancel: None,
        }
    }

    pub fn with_run_if(mut self, run_if: RunIf) -> Self {
        self.run_if.push(run_if);
        self
    }

    pub fn with_on_cancel(mut self, task: TaskConfig) -> Self {
        self.on_cancel = Some(Box::new(task));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub run_type: RunType,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub artifact_plans: Vec<ArtifactPlan>,
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_type: RunType::Simple,
            resources: vec![],
            artifact_plans: vec![],
            variables: vec![],
            tasks: vec![],
        }
    }

    pub fn with_run_type(mut self, run_type: RunType) -> Self {
        self.run_type = run_type;
        self
    }

    pub fn with_resources(mut self, resources: &[&str]) -> Self {
        self.resources = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push(EnvironmentVariable::new(name, value));
        self
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_artifact(mut self, plan: ArtifactPlan) -> Self {
        self.artifact_plans.push(plan);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
    #[serde(default)]
    pub approval: ApprovalType,
    #[serde(default = "default_fetch_materials")]
    pub fetch_materials: bool,
    #[serde(default)]
    pub clean_working_dir: bool,
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

fn default_fetch_materials() -> bool {
    true
}

impl StageConfig {
    pub fn new(name: impl Into<String>, jobs: Vec<JobConfig>) -> Self {
        Self {
            name: name.into(),
            jobs,
            approval: ApprovalType::Success,
            fetch_materials: true,
            clean_working_dir: false,
            variables: vec![],
        }
    }

    /// Job names are case-insensitive.
    pub fn job_by_name(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    /// SHA-256 of the serialized configuration, hex encoded.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&bytes);
        Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
