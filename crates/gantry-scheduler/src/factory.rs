//! Expansion of stage configuration into job instances, for fresh runs and
//! for reruns of selected jobs.

use crate::context::SchedulingContext;
use crate::naming;
use chrono::{DateTime, Utc};
use gantry_core::config::{JobConfig, RunType, StageConfig};
use gantry_core::env::EnvironmentVariable;
use gantry_core::ids::StageId;
use gantry_core::job::JobInstance;
use gantry_core::plan::{JobIdentifier, JobPlan};
use gantry_core::stage::Stage;
use gantry_core::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info};

pub const GO_JOB_RUN_INDEX: &str = "GO_JOB_RUN_INDEX";
pub const GO_JOB_RUN_COUNT: &str = "GO_JOB_RUN_COUNT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineIdentity {
    pub name: String,
    pub counter: u32,
    pub label: String,
}

impl PipelineIdentity {
    pub fn new(name: impl Into<String>, counter: u32, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counter,
            label: label.into(),
        }
    }
}

/// Creates stages and job instances. Stateless; every call is a pure
/// function of its arguments apart from transition timestamps.
pub struct InstanceFactory;

impl InstanceFactory {
    pub fn new() -> Self {
        Self
    }

    /// Schedules every job of `stage_config` for a new stage run.
    pub fn create_stage_instance(
        &self,
        pipeline: &PipelineIdentity,
        stage_config: &StageConfig,
        context: &SchedulingContext,
        config_version: &str,
        counter: u32,
    ) -> Result<Stage> {
        let now = Utc::now();
        let stage_identifier = JobIdentifier::new(
            pipeline.name.clone(),
            pipeline.counter,
            pipeline.label.clone(),
            stage_config.name.clone(),
            counter.to_string(),
            "",
        );
        let jobs = self.create_jobs(&stage_identifier, stage_config, context, now)?;

        info!(
            pipeline = %pipeline.name,
            stage = %stage_config.name,
            counter,
            jobs = jobs.len(),
            "Scheduled stage"
        );

        Ok(Stage {
            id: StageId::NOT_PERSISTED,
            name: stage_config.name.clone(),
            counter,
            pipeline_name: pipeline.name.clone(),
            pipeline_counter: pipeline.counter,
            pipeline_label: pipeline.label.clone(),
            jobs,
            approval_type: stage_config.approval,
            approved_by: context.approver().to_string(),
            config_version: Some(config_version.to_string()),
            rerun_of_counter: None,
            fetch_materials: stage_config.fetch_materials,
            clean_working_dir: stage_config.clean_working_dir,
            created_at: now,
        })
    }

    /// Job instances for every job of the stage, in configuration order.
    pub fn create_jobs(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobInstance>> {
        let mut jobs = Vec::new();
        for job_config in &stage_config.jobs {
            jobs.extend(self.schedule_job(stage_identifier, stage_config, job_config, context, now)?);
        }
        Ok(jobs)
    }

    /// A new stage run that reruns `job_names` and carries every other job
    /// of `stage` forward as a copy. Copies come first in their original
    /// order, followed by the rerun jobs in request order.
    pub fn create_stage_for_rerun_of_jobs(
        &self,
        stage: &Stage,
        job_names: &[&str],
        context: &SchedulingContext,
        stage_config: &StageConfig,
        config_version: &str,
    ) -> Result<Stage> {
        let now = Utc::now();
        let counter = stage.counter + 1;
        let stage_identifier = JobIdentifier::new(
            stage.pipeline_name.clone(),
            stage.pipeline_counter,
            stage.pipeline_label.clone(),
            stage.name.clone(),
            counter.to_string(),
            "",
        );

        let mut requested: Vec<&JobInstance> = Vec::new();
        for name in job_names {
            let job = stage
                .job_by_name(name)
                .ok_or_else(|| Error::JobNotFound((*name).to_string()))?;
            if !requested.iter().any(|r| r.name == job.name) {
                requested.push(job);
            }
        }

        let mut reruns = Vec::new();
        let mut simple_jobs = HashSet::new();
        for old in &requested {
            let config_name = naming::config_name(&old.name);
            let job_config = stage_config.job_by_name(config_name).ok_or_else(|| {
                Error::cannot_rerun(config_name, "Configuration for job doesn't exist.")
            })?;
            ensure_run_type_unchanged(old, job_config, config_name)?;

            let mut jobs = match job_config.run_type {
                RunType::Simple => {
                    if !simple_jobs.insert(job_config.name.to_ascii_lowercase()) {
                        return Err(Error::IllegalArgument(format!(
                            "Cannot schedule multiple instances of job named '{}'.",
                            config_name
                        )));
                    }
                    let mut job = self.simple_instance(
                        &stage_identifier,
                        stage_config,
                        job_config,
                        context,
                        now,
                    );
                    if old.run_on_all_agents {
                        pin(&mut job, old);
                    }
                    vec![job]
                }
                RunType::RunOnAllAgents if old.run_on_all_agents => {
                    let mut job = self.instance(
                        &stage_identifier,
                        stage_config,
                        job_config,
                        context,
                        &old.name,
                        vec![],
                        now,
                    );
                    job.run_on_all_agents = true;
                    pin(&mut job, old);
                    vec![job]
                }
                RunType::RunOnAllAgents => self.run_on_all_instances(
                    &stage_identifier,
                    stage_config,
                    job_config,
                    context,
                    now,
                )?,
                RunType::RunMultipleInstance { count } => {
                    let index = naming::run_instance_index(&old.name).ok_or_else(|| {
                        Error::Internal(format!("Not a run-multiple-instance job: {}", old.name))
                    })?;
                    vec![self.run_instance(
                        &stage_identifier,
                        stage_config,
                        job_config,
                        context,
                        index,
                        count,
                        now,
                    )]
                }
            };
            for job in &mut jobs {
                job.rerun = true;
            }
            reruns.extend(jobs);
        }

        let mut jobs: Vec<JobInstance> = stage
            .jobs
            .iter()
            .filter(|j| !requested.iter().any(|r| r.name == j.name))
            .map(JobInstance::clone_for_rerun_copy)
            .collect();
        let copied = jobs.len();
        jobs.extend(reruns);

        let rerun_of_counter = stage.rerun_of_counter.unwrap_or(stage.counter);
        info!(
            pipeline = %stage.pipeline_name,
            stage = %stage.name,
            counter,
            rerun_of_counter,
            copied,
            rerun = jobs.len() - copied,
            "Scheduled rerun of jobs"
        );

        Ok(Stage {
            id: StageId::NOT_PERSISTED,
            name: stage.name.clone(),
            counter,
            pipeline_name: stage.pipeline_name.clone(),
            pipeline_counter: stage.pipeline_counter,
            pipeline_label: stage.pipeline_label.clone(),
            jobs,
            approval_type: stage_config.approval,
            approved_by: context.approver().to_string(),
            config_version: Some(config_version.to_string()),
            rerun_of_counter: Some(rerun_of_counter),
            fetch_materials: stage_config.fetch_materials,
            clean_working_dir: stage_config.clean_working_dir,
            created_at: now,
        })
    }

    fn schedule_job(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        job_config: &JobConfig,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobInstance>> {
        match job_config.run_type {
            RunType::Simple => Ok(vec![self.simple_instance(
                stage_identifier,
                stage_config,
                job_config,
                context,
                now,
            )]),
            RunType::RunOnAllAgents => {
                self.run_on_all_instances(stage_identifier, stage_config, job_config, context, now)
            }
            RunType::RunMultipleInstance { count } => Ok((1..=count)
                .map(|index| {
                    self.run_instance(
                        stage_identifier,
                        stage_config,
                        job_config,
                        context,
                        index,
                        count,
                        now,
                    )
                })
                .collect()),
        }
    }

    fn simple_instance(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        job_config: &JobConfig,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> JobInstance {
        self.instance(
            stage_identifier,
            stage_config,
            job_config,
            context,
            &job_config.name,
            vec![],
            now,
        )
    }

    fn run_on_all_instances(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        job_config: &JobConfig,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobInstance>> {
        let agents = context.find_agents_matching(&job_config.resources);
        if agents.is_empty() {
            return Err(Error::NoMatchingAgents {
                job_name: job_config.name.clone(),
                stage_name: stage_config.name.clone(),
            });
        }

        debug!(job = %job_config.name, agents = agents.len(), "Expanding run-on-all-agents job");

        Ok(agents
            .into_iter()
            .enumerate()
            .map(|(i, agent)| {
                let name = naming::run_on_all_name(&job_config.name, i + 1);
                let mut job = self.instance(
                    stage_identifier,
                    stage_config,
                    job_config,
                    context,
                    &name,
                    vec![],
                    now,
                );
                job.run_on_all_agents = true;
                job.agent_uuid = Some(agent.uuid.clone());
                job.plan.agent_uuid = Some(agent.uuid.clone());
                job
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_instance(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        job_config: &JobConfig,
        context: &SchedulingContext,
        index: u32,
        count: u32,
        now: DateTime<Utc>,
    ) -> JobInstance {
        let name = naming::run_instance_name(&job_config.name, index);
        let leading = vec![
            EnvironmentVariable::new(GO_JOB_RUN_INDEX, index.to_string()),
            EnvironmentVariable::new(GO_JOB_RUN_COUNT, count.to_string()),
        ];
        let mut job = self.instance(
            stage_identifier,
            stage_config,
            job_config,
            context,
            &name,
            leading,
            now,
        );
        job.run_multiple_instance = true;
        job
    }

    #[allow(clippy::too_many_arguments)]
    fn instance(
        &self,
        stage_identifier: &JobIdentifier,
        stage_config: &StageConfig,
        job_config: &JobConfig,
        context: &SchedulingContext,
        name: &str,
        leading_variables: Vec<EnvironmentVariable>,
        now: DateTime<Utc>,
    ) -> JobInstance {
        let mut variables = leading_variables;
        variables.extend(stage_config.variables.iter().cloned());
        variables.extend(job_config.variables.iter().cloned());

        let plan = JobPlan {
            identifier: stage_identifier.with_job_name(name),
            resources: job_config.resources.clone(),
            artifact_plans: job_config.artifact_plans.clone(),
            variables,
            trigger_variables: context.trigger_variables().to_vec(),
            agent_uuid: None,
            fetch_materials: stage_config.fetch_materials,
            clean_working_dir: stage_config.clean_working_dir,
            environment_name: context.environment_name().map(str::to_string),
        };
        JobInstance::scheduled(name, plan, now)
    }
}

impl Default for InstanceFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects changes into or out of run-multiple-instance. Simple and
/// run-on-all-agents may be swapped freely.
fn ensure_run_type_unchanged(old: &JobInstance, config: &JobConfig, config_name: &str) -> Result<()> {
    if old.run_multiple_instance != config.run_type.is_run_multiple_instance() {
        return Err(Error::cannot_rerun(
            config_name,
            format!(
                "Run configuration for job has been changed to '{}'.",
                config.run_type
            ),
        ));
    }
    Ok(())
}

fn pin(job: &mut JobInstance, previous: &JobInstance) {
    job.agent_uuid = previous.agent_uuid.clone();
    job.plan.agent_uuid = previous.agent_uuid.clone();
}
