//! Conversion of configured tasks into executable builders.

use gantry_core::builder::{Builder, BuilderKind, FetchSpec};
use gantry_core::config::{JobConfig, TaskConfig, TaskKind};
use gantry_core::material::BuildCause;
use gantry_core::plan::JobIdentifier;
use gantry_core::{Error, Result};

pub struct BuilderFactory;

impl BuilderFactory {
    pub fn new() -> Self {
        Self
    }

    /// One builder per task, in task order.
    pub fn builders_for(
        &self,
        job_config: &JobConfig,
        identifier: &JobIdentifier,
        cause: &BuildCause,
    ) -> Result<Vec<Builder>> {
        job_config
            .tasks
            .iter()
            .map(|task| self.builder_for(task, identifier, cause))
            .collect()
    }

    pub fn builder_for(
        &self,
        task: &TaskConfig,
        identifier: &JobIdentifier,
        cause: &BuildCause,
    ) -> Result<Builder> {
        let mut builder = match &task.kind {
            TaskKind::Exec {
                command,
                args,
                working_dir,
            } => {
                let description = if args.is_empty() {
                    command.clone()
                } else {
                    format!("{} {}", command, args.join(" "))
                };
                Builder::new(
                    BuilderKind::Exec {
                        command: command.clone(),
                        args: args.clone(),
                        working_dir: working_dir.clone(),
                    },
                    description,
                )
            }
            TaskKind::Fetch {
                pipeline,
                stage,
                job,
                source,
                dest,
                is_file,
            } => {
                let locator = self.fetch_locator(pipeline.as_deref(), stage, job, identifier, cause)?;
                let dest = dest.clone().unwrap_or_default();
                let description = format!("fetch artifact [{}] => [{}] from [{}]", source, dest, locator);
                Builder::new(
                    BuilderKind::Fetch(FetchSpec {
                        locator,
                        source: source.clone(),
                        dest,
                        is_file: *is_file,
                    }),
                    description,
                )
            }
            TaskKind::Plugin {
                plugin_id,
                configuration,
            } => Builder::new(
                BuilderKind::Plugin {
                    plugin_id: plugin_id.clone(),
                    configuration: configuration.clone(),
                },
                format!("plugin task [{}]", plugin_id),
            ),
        };

        builder.run_if = task.run_if.clone();
        if let Some(on_cancel) = &task.on_cancel {
            builder.on_cancel = Some(Box::new(self.builder_for(on_cancel, identifier, cause)?));
        }
        Ok(builder)
    }

    /// Locator of the job to fetch from. The current pipeline run for local
    /// fetches, otherwise the upstream run recorded in the build cause.
    fn fetch_locator(
        &self,
        pipeline: Option<&str>,
        stage: &str,
        job: &str,
        identifier: &JobIdentifier,
        cause: &BuildCause,
    ) -> Result<String> {
        let pipeline = match pipeline {
            Some(p) if !p.eq_ignore_ascii_case(&identifier.pipeline_name) => p,
            _ => {
                return Ok(format!(
                    "{}/{}/{}/latest/{}",
                    identifier.pipeline_name, identifier.pipeline_counter, stage, job
                ));
            }
        };

        let revision = cause
            .material_revisions
            .find_dependency_revision(pipeline)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Pipeline [{}] is not an upstream dependency of [{}]",
                    pipeline, identifier.pipeline_name
                ))
            })?;

        let mut parts = revision.revision.split('/');
        let (Some(upstream), Some(counter)) = (parts.next(), parts.next()) else {
            return Err(Error::Config(format!(
                "Malformed dependency revision: {}",
                revision.revision
            )));
        };
        Ok(format!("{}/{}/{}/latest/{}", upstream, counter, stage, job))
    }
}

impl Default for BuilderFactory {
    fn default() -> Self {
        Self::new()
    }
}
