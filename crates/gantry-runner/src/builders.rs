//! Sequential execution of a job's builders.
//!
//! Builders run one after another on the calling thread. Each carries run-if
//! conditions evaluated against the result so far. Cancellation is a shared
//! flag raised from another thread: once it is set no new builder starts and,
//! provided some builder had started, every builder's cancel hook runs.

use crate::exec;
use gantry_core::builder::{Builder, BuilderKind};
use gantry_core::env::EnvironmentVariableContext;
use gantry_core::job::JobResult;
use gantry_core::plan::JobIdentifier;
use gantry_core::ports::{ArtifactSink, ConsoleOut, TaskExtension, TaskRequest};
use gantry_core::{Error, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Cancellation token shared between the build thread and its controller.
#[derive(Debug, Clone)]
pub struct CancelFlag(Arc<watch::Sender<bool>>);

impl Default for CancelFlag {
    fn default() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.set(true);
    }

    pub fn set(&self, cancelled: bool) {
        self.0.send_replace(cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is raised, immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Everything a builder needs from the job it runs in.
pub struct BuildContext<'a> {
    /// Runtime that drives child processes; the build itself runs on a
    /// blocking thread.
    pub runtime: &'a Handle,
    pub working_dir: &'a Path,
    pub environment: &'a EnvironmentVariableContext,
    pub console: &'a dyn ConsoleOut,
    pub artifacts: &'a dyn ArtifactSink,
    pub tasks: Option<&'a dyn TaskExtension>,
    pub job: &'a JobIdentifier,
}

#[derive(Debug)]
pub struct Builders {
    builders: Vec<Builder>,
    cancelled: CancelFlag,
    current: Mutex<Option<usize>>,
}

impl Builders {
    pub fn new(builders: Vec<Builder>) -> Self {
        Self {
            builders,
            cancelled: CancelFlag::new(),
            current: Mutex::new(None),
        }
    }

    /// A collection that was cancelled before it ever ran.
    pub fn cancelled(builders: Vec<Builder>) -> Self {
        let builders = Self::new(builders);
        builders.set_is_cancelled(true);
        builders
    }

    pub fn set_is_cancelled(&self, cancelled: bool) {
        self.cancelled.set(cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Handle for raising cancellation from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancelled.clone()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Runs every builder whose run-if conditions accept the result so far
    /// and returns the job result.
    pub fn build(&self, ctx: &BuildContext<'_>) -> JobResult {
        let mut result = JobResult::Passed;

        for (index, builder) in self.builders.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            if !builder.allows_run(result) {
                debug!(job = %ctx.job, task = %builder.description, "Skipping task");
                continue;
            }
            *self.current.lock() = Some(index);

            ctx.console
                .print_go(&format!("Start to execute task: {}.", builder.description));
            match run_guarded(builder, ctx, &self.cancelled) {
                Ok(()) => {}
                Err(Error::Cancelled) => break,
                Err(e) => {
                    warn!(job = %ctx.job, task = %builder.description, error = %e, "Task failed");
                    ctx.console.print_go(&e.to_string());
                    result = JobResult::Failed;
                }
            }
            ctx.console
                .print_go(&format!("Current job status: {}.", result.as_status()));
        }

        if self.is_cancelled() {
            self.run_cancel_hooks(ctx);
            info!(job = %ctx.job, "Build cancelled");
            return JobResult::Cancelled;
        }
        result
    }

    /// Raises the cancellation flag. The running builder observes it and the
    /// build thread then runs the cancel hooks.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Runs every builder's cancel hook in order, unless cancellation arrived
    /// before any builder started.
    fn run_cancel_hooks(&self, ctx: &BuildContext<'_>) {
        if self.current.lock().is_none() {
            return;
        }
        // Hooks must not be killed by the cancellation they react to.
        let uncancelled = CancelFlag::new();
        for hook in self.builders.iter().filter_map(|b| b.on_cancel.as_deref()) {
            ctx.console
                .print_go(&format!("On Cancel Task: {}", hook.description));
            if let Err(e) = run_guarded(hook, ctx, &uncancelled) {
                error!(job = %ctx.job, task = %hook.description, error = %e, "Cancel task failed");
                ctx.console.print_go(&e.to_string());
            }
        }
    }
}

impl PartialEq for Builders {
    fn eq(&self, other: &Self) -> bool {
        self.builders == other.builders && self.is_cancelled() == other.is_cancelled()
    }
}

/// Runs one builder, turning a panic into an error.
fn run_guarded(builder: &Builder, ctx: &BuildContext<'_>, cancel: &CancelFlag) -> Result<()> {
    catch_unwind(AssertUnwindSafe(|| execute(builder, ctx, cancel)))
        .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic.as_ref()))))
}

fn execute(builder: &Builder, ctx: &BuildContext<'_>, cancel: &CancelFlag) -> Result<()> {
    match &builder.kind {
        BuilderKind::Exec {
            command,
            args,
            working_dir,
        } => {
            let dir = match working_dir {
                Some(relative) => ctx.working_dir.join(relative),
                None => ctx.working_dir.to_path_buf(),
            };
            exec::run_command(
                ctx.runtime,
                command,
                args,
                &dir,
                ctx.environment,
                ctx.console,
                cancel,
            )
        }
        BuilderKind::Fetch(spec) => {
            let dest = ctx.working_dir.join(&spec.dest);
            ctx.artifacts.fetch(ctx.console, spec, &dest)
        }
        BuilderKind::Plugin {
            plugin_id,
            configuration,
        } => {
            let tasks = ctx.tasks.ok_or_else(|| {
                Error::PluginExecutionFailed(format!("No task extension handles '{}'", plugin_id))
            })?;
            let request = TaskRequest {
                working_dir: ctx.working_dir,
                environment: ctx.environment,
                configuration,
                console: ctx.console,
            };
            let response = tasks.execute(plugin_id, &request)?;
            if response.success {
                Ok(())
            } else {
                Err(Error::PluginExecutionFailed(response.message))
            }
        }
        BuilderKind::Null => Ok(()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
