//! Publishing of job artifacts and job properties through the artifact sink.

use crate::artifacts::match_plan;
use gantry_core::job::JobResult;
use gantry_core::plan::{ArtifactPlan, JobIdentifier};
use gantry_core::ports::{ArtifactSink, ConsoleOut, Property};
use gantry_core::{Error, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub struct ArtifactsPublisher<'a> {
    sink: &'a dyn ArtifactSink,
    console: &'a dyn ConsoleOut,
}

impl<'a> ArtifactsPublisher<'a> {
    pub fn new(sink: &'a dyn ArtifactSink, console: &'a dyn ConsoleOut) -> Self {
        Self { sink, console }
    }

    /// Uploads every plan's matches. All plans are attempted; the first
    /// failure is returned once they have been.
    pub fn publish(&self, plans: &[ArtifactPlan], working_dir: &Path, job: &JobIdentifier) -> Result<()> {
        let mut first_failure = None;

        for plan in plans {
            if let Err(e) = self.publish_plan(plan, working_dir, job) {
                warn!(job = %job, pattern = %plan.source_pattern(), error = %e, "Artifact upload failed");
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn publish_plan(&self, plan: &ArtifactPlan, working_dir: &Path, job: &JobIdentifier) -> Result<()> {
        let uploads = match match_plan(plan, working_dir) {
            Ok(uploads) => uploads,
            Err(e) => {
                self.console.print_go(&e.to_string());
                return Err(e);
            }
        };

        for upload in &uploads {
            let published = catch_unwind(AssertUnwindSafe(|| {
                self.sink
                    .publish(self.console, &upload.dest, &upload.source, job)
            }));
            if !matches!(published, Ok(Ok(()))) {
                let failure = Error::UploadFailed(plan.source_pattern().to_string());
                self.console.print_go(&failure.to_string());
                return Err(failure);
            }
        }

        info!(job = %job, pattern = %plan.source_pattern(), count = uploads.len(), "Artifacts published");
        Ok(())
    }

    /// Records the standard job properties. Failures are logged only.
    pub fn set_job_properties(
        &self,
        job: &JobIdentifier,
        agent_location: &str,
        result: JobResult,
        duration: Duration,
    ) {
        let properties = [
            Property::new("cruise_agent", agent_location),
            Property::new("cruise_job_duration", duration.as_secs().to_string()),
            Property::new("cruise_job_result", result.to_string()),
            Property::new("cruise_job_id", job.build_id.to_string()),
            Property::new("cruise_pipeline_label", job.pipeline_label.as_str()),
            Property::new("cruise_pipeline_counter", job.pipeline_counter.to_string()),
            Property::new("cruise_stage_counter", job.stage_counter.as_str()),
        ];

        for property in &properties {
            if let Err(e) = self.sink.set_property(job, property) {
                warn!(job = %job, key = %property.key, error = %e, "Failed to set job property");
            }
        }
    }
}
