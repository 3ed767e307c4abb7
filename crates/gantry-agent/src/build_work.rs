//! Running one build assignment end to end.
//!
//! Lifecycle: the agent goes Building, the job reports Preparing, Building,
//! Completing and Completed, artifacts and job properties are published and
//! the agent returns to Idle. Every failure along the way ends in a job
//! result rather than an error.

use crate::work::{SharedRuntimeInfo, WorkContext};
use gantry_core::{Error, Result};
use gantry_core::agent::AgentRuntimeInfo;
use gantry_core::assignment::BuildAssignment;
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::job::{JobResult, JobState};
use gantry_core::plan::JobIdentifier;
use gantry_core::ports::ConsoleOut;
use gantry_runner::{ArtifactsPublisher, BuildContext, Builders, ConsoleTransmitter, MaskingConsole};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[derive(Debug)]
pub struct BuildWork {
    assignment: BuildAssignment,
    builders: Builders,
    /// Set between going Building and going back to Idle. Only changed while
    /// the runtime info is locked.
    in_progress: AtomicBool,
}

impl BuildWork {
    pub fn new(assignment: BuildAssignment) -> Self {
        let builders = Builders::new(assignment.builders().to_vec());
        Self {
            assignment,
            builders,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn assignment(&self) -> &BuildAssignment {
        &self.assignment
    }

    pub fn is_cancelled(&self) -> bool {
        self.builders.is_cancelled()
    }

    /// Stops the build from another thread. The agent only reports itself
    /// as cancelling while the build is actually running.
    pub fn cancel(&self, runtime: &SharedRuntimeInfo) {
        info!(job = %self.assignment.job_identifier(), "Cancelling build");
        self.builders.cancel();
        let mut runtime = runtime.lock();
        if self.in_progress.load(Ordering::SeqCst) {
            runtime.cancel();
        }
    }

    /// Runs the assignment on the calling thread and returns the reported
    /// result, or `None` when the server had already dropped the job.
    ///
    /// Must run on a blocking thread of a tokio runtime.
    pub fn do_work(&self, ctx: &WorkContext) -> Result<Option<JobResult>> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Internal(format!("Build needs a tokio runtime: {}", e)))?;
        let job = self.assignment.job_identifier().clone();
        {
            let mut runtime = ctx.runtime.lock();
            runtime.busy(job.build_locator());
            self.in_progress.store(true, Ordering::SeqCst);
        }

        let transmitter = ConsoleTransmitter::start(
            &handle,
            ctx.console.clone(),
            job.clone(),
            ctx.console_publish_interval,
        );
        let outcome = {
            let secrets = self.assignment.initial_environment_variable_context().secure_values();
            let console = MaskingConsole::new(&transmitter, secrets);
            self.run(ctx, &handle, &console, &job)
        };
        transmitter.stop();

        {
            let mut runtime = ctx.runtime.lock();
            self.in_progress.store(false, Ordering::SeqCst);
            runtime.idle();
        }
        info!(job = %job, result = ?outcome, "Build finished");
        Ok(outcome)
    }

    fn run(
        &self,
        ctx: &WorkContext,
        handle: &Handle,
        console: &dyn ConsoleOut,
        job: &JobIdentifier,
    ) -> Option<JobResult> {
        let started = Instant::now();

        let ignored = ctx.remote.is_ignored(job).unwrap_or_else(|e| {
            warn!(job = %job, error = %e, "Could not check whether job is ignored");
            false
        });
        if ignored {
            info!(job = %job, "Job is ignored by the server, not building");
            report(ctx, job, "status", |info| {
                ctx.remote.report_current_status(info, job, JobState::Completed)
            });
            return None;
        }

        report(ctx, job, "status", |info| {
            ctx.remote.report_current_status(info, job, JobState::Preparing)
        });
        let working_dir = self.working_directory(ctx);

        let mut result = match self.prepare(ctx, console, &working_dir) {
            Ok(environment) => {
                report(ctx, job, "status", |info| {
                    ctx.remote.report_current_status(info, job, JobState::Building)
                });
                let build = BuildContext {
                    runtime: handle,
                    working_dir: &working_dir,
                    environment: &environment,
                    console,
                    artifacts: ctx.artifacts.as_ref(),
                    tasks: ctx.tasks.as_deref(),
                    job,
                };
                self.builders.build(&build)
            }
            Err(e) => {
                warn!(job = %job, error = %e, "Failed to prepare build");
                console.print_go(&format!("Failed to prepare build: {}", e));
                JobResult::Failed
            }
        };

        report(ctx, job, "completing", |info| ctx.remote.report_completing(info, job, result));

        let publisher = ArtifactsPublisher::new(ctx.artifacts.as_ref(), console);
        if publisher
            .publish(self.assignment.artifact_plans(), &working_dir, job)
            .is_err()
            && result == JobResult::Passed
        {
            result = JobResult::Failed;
        }
        let location = ctx.runtime.lock().identifier.hostname.clone();
        publisher.set_job_properties(job, &location, result, started.elapsed());

        report(ctx, job, "completed", |info| ctx.remote.report_completed(info, job, result));
        Some(result)
    }

    fn prepare(&self, ctx: &WorkContext, console: &dyn ConsoleOut, working_dir: &Path) -> Result<EnvironmentVariableContext> {
        if self.assignment.should_clean_working_dir() && working_dir.exists() {
            console.print_go(&format!("Cleaning working directory \"{}\"", working_dir.display()));
            fs::remove_dir_all(working_dir)?;
        }
        fs::create_dir_all(working_dir)?;

        if !self.assignment.should_fetch_materials() {
            console.print_go("Skipping material update since stage is configured not to fetch materials");
        }

        let environment = self.assignment.initial_environment_variable_context().clone();
        for line in environment.report_lines(&ctx.ambient) {
            console.consume_line(&line);
        }
        Ok(environment)
    }

    /// Where the job runs on this agent.
    pub fn working_directory(&self, ctx: &WorkContext) -> PathBuf {
        ctx.work_dir.join(self.assignment.working_directory())
    }
}

/// Pushes one state report. Failures are logged; the build carries on.
fn report(
    ctx: &WorkContext,
    job: &JobIdentifier,
    what: &str,
    send: impl FnOnce(&AgentRuntimeInfo) -> Result<()>,
) {
    let info = ctx.runtime_info();
    if let Err(e) = send(&info) {
        warn!(job = %job, report = what, error = %e, "Failed to report to server");
    }
}
