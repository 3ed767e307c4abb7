//! The immutable unit of work sent to an agent.

use crate::builder::Builder;
use crate::env::EnvironmentVariableContext;
use crate::material::BuildCause;
use crate::plan::{ArtifactPlan, JobIdentifier, JobPlan};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything an agent needs to run one job. The build cause never carries
/// per-file modification details, only revision identifiers, however the
/// assignment was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBuildAssignment")]
pub struct BuildAssignment {
    plan: JobPlan,
    build_cause: BuildCause,
    builders: Vec<Builder>,
    working_directory: PathBuf,
    initial_context: EnvironmentVariableContext,
}

/// Wire shape of an assignment before its build cause is stripped.
#[derive(Deserialize)]
struct RawBuildAssignment {
    plan: JobPlan,
    build_cause: BuildCause,
    builders: Vec<Builder>,
    working_directory: PathBuf,
    initial_context: EnvironmentVariableContext,
}

impl From<RawBuildAssignment> for BuildAssignment {
    fn from(raw: RawBuildAssignment) -> Self {
        Self::new(
            raw.plan,
            &raw.build_cause,
            raw.builders,
            raw.working_directory,
            raw.initial_context,
        )
    }
}

impl BuildAssignment {
    pub fn new(
        plan: JobPlan,
        build_cause: &BuildCause,
        builders: Vec<Builder>,
        working_directory: PathBuf,
        initial_context: EnvironmentVariableContext,
    ) -> Self {
        Self {
            plan,
            build_cause: build_cause.without_modified_files(),
            builders,
            working_directory,
            initial_context,
        }
    }

    pub fn job_identifier(&self) -> &JobIdentifier {
        &self.plan.identifier
    }

    pub fn plan(&self) -> &JobPlan {
        &self.plan
    }

    pub fn build_cause(&self) -> &BuildCause {
        &self.build_cause
    }

    pub fn builders(&self) -> &[Builder] {
        &self.builders
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn artifact_plans(&self) -> &[ArtifactPlan] {
        &self.plan.artifact_plans
    }

    pub fn should_fetch_materials(&self) -> bool {
        self.plan.fetch_materials
    }

    pub fn should_clean_working_dir(&self) -> bool {
        self.plan.clean_working_dir
    }

    /// Resolved job environment: base layer, built-ins, job variables and
    /// trigger overrides, in that order.
    pub fn initial_environment_variable_context(&self) -> &EnvironmentVariableContext {
        &self.initial_context
    }
}
