//! Job plans: the schedulable unit handed from scheduling to assignment.

use crate::env::EnvironmentVariable;
use crate::ids::{AgentUuid, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully qualified position of a job run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentifier {
    pub pipeline_name: String,
    pub pipeline_counter: u32,
    pub pipeline_label: String,
    pub stage_name: String,
    pub stage_counter: String,
    pub job_name: String,
    #[serde(default)]
    pub build_id: JobId,
}

impl JobIdentifier {
    pub fn new(
        pipeline_name: impl Into<String>,
        pipeline_counter: u32,
        pipeline_label: impl Into<String>,
        stage_name: impl Into<String>,
        stage_counter: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            pipeline_counter,
            pipeline_label: pipeline_label.into(),
            stage_name: stage_name.into(),
            stage_counter: stage_counter.into(),
            job_name: job_name.into(),
            build_id: JobId::NOT_PERSISTED,
        }
    }

    pub fn with_job_name(&self, job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            build_id: JobId::NOT_PERSISTED,
            ..self.clone()
        }
    }

    pub fn stage_locator(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.pipeline_name, self.pipeline_counter, self.stage_name, self.stage_counter
        )
    }

    pub fn build_locator(&self) -> String {
        format!("{}/{}", self.stage_locator(), self.job_name)
    }
}

impl fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_locator())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    #[default]
    File,
    Test,
}

/// One upload rule: a source pattern relative to the working directory and
/// a destination folder on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub source: String,
    #[serde(default)]
    pub dest: String,
    #[serde(default)]
    pub artifact_type: ArtifactType,
}

impl ArtifactPlan {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            artifact_type: ArtifactType::File,
        }
    }

    pub fn test(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: "testoutput".to_string(),
            artifact_type: ArtifactType::Test,
        }
    }

    /// Source pattern with surrounding whitespace removed.
    pub fn source_pattern(&self) -> &str {
        self.source.trim()
    }

    pub fn dest(&self) -> &str {
        self.dest.trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub identifier: JobIdentifier,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub artifact_plans: Vec<ArtifactPlan>,
    /// Job-configured variables, in application order.
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
    /// Trigger-time overrides, applied after everything else.
    #[serde(default)]
    pub trigger_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub agent_uuid: Option<AgentUuid>,
    #[serde(default = "default_true")]
    pub fetch_materials: bool,
    #[serde(default)]
    pub clean_working_dir: bool,
    #[serde(default)]
    pub environment_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl JobPlan {
    pub fn for_identifier(identifier: JobIdentifier) -> Self {
        Self {
            identifier,
            resources: vec![],
            artifact_plans: vec![],
            variables: vec![],
            trigger_variables: vec![],
            agent_uuid: None,
            fetch_materials: true,
            clean_working_dir: false,
            environment_name: None,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.identifier.job_name
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }
}
