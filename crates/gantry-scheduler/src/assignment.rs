//! Build assignment assembly and job environment resolution.

use gantry_core::assignment::BuildAssignment;
use gantry_core::builder::Builder;
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::material::BuildCause;
use gantry_core::plan::JobPlan;
use gantry_core::system::SystemConfig;
use std::path::PathBuf;
use tracing::debug;

pub const GO_SERVER_URL: &str = "GO_SERVER_URL";
pub const GO_ENVIRONMENT_NAME: &str = "GO_ENVIRONMENT_NAME";
pub const GO_PIPELINE_NAME: &str = "GO_PIPELINE_NAME";
pub const GO_PIPELINE_LABEL: &str = "GO_PIPELINE_LABEL";
pub const GO_PIPELINE_COUNTER: &str = "GO_PIPELINE_COUNTER";
pub const GO_STAGE_NAME: &str = "GO_STAGE_NAME";
pub const GO_STAGE_COUNTER: &str = "GO_STAGE_COUNTER";
pub const GO_JOB_NAME: &str = "GO_JOB_NAME";
pub const GO_TRIGGER_USER: &str = "GO_TRIGGER_USER";

pub struct BuildAssignmentAssembler {
    system: SystemConfig,
}

impl BuildAssignmentAssembler {
    pub fn new(system: SystemConfig) -> Self {
        Self { system }
    }

    pub fn assemble(
        &self,
        plan: JobPlan,
        cause: &BuildCause,
        builders: Vec<Builder>,
        working_directory: PathBuf,
        base: Option<&EnvironmentVariableContext>,
    ) -> BuildAssignment {
        let context = self.initial_environment(&plan, cause, base);
        debug!(
            job = %plan.identifier,
            variables = context.len(),
            builders = builders.len(),
            "Assembled build assignment"
        );
        BuildAssignment::new(plan, cause, builders, working_directory, context)
    }

    /// Default working directory for a plan's pipeline.
    pub fn working_directory_for(&self, plan: &JobPlan) -> PathBuf {
        self.system
            .working_directory_for(&plan.identifier.pipeline_name)
    }

    /// Applies, in order: the base context, computed built-ins, job
    /// variables and trigger-time overrides. A later layer replaces an
    /// earlier value of the same name.
    pub fn initial_environment(
        &self,
        plan: &JobPlan,
        cause: &BuildCause,
        base: Option<&EnvironmentVariableContext>,
    ) -> EnvironmentVariableContext {
        let mut context = base.cloned().unwrap_or_default();

        if let Some(url) = &self.system.server_url {
            context.set_property(GO_SERVER_URL, url.clone(), false);
        }
        if let Some(environment) = &plan.environment_name {
            context.set_property(GO_ENVIRONMENT_NAME, environment.clone(), false);
        }

        let id = &plan.identifier;
        context.set_property(GO_PIPELINE_NAME, id.pipeline_name.clone(), false);
        context.set_property(GO_PIPELINE_LABEL, id.pipeline_label.clone(), false);
        context.set_property(GO_PIPELINE_COUNTER, id.pipeline_counter.to_string(), false);
        context.set_property(GO_STAGE_NAME, id.stage_name.clone(), false);
        context.set_property(GO_STAGE_COUNTER, id.stage_counter.clone(), false);
        context.set_property(GO_JOB_NAME, id.job_name.clone(), false);
        context.set_property(GO_TRIGGER_USER, cause.approver.clone(), false);
        cause.material_revisions.populate_environment(&mut context);

        context.add_all(&plan.variables);
        context.add_all(&plan.trigger_variables);
        context
    }
}

impl Default for BuildAssignmentAssembler {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}
