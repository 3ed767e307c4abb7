//! The agent's main loop: register, ping, poll for work and run it.

use crate::config::AgentConfig;
use crate::remote::AgentInstruction;
use crate::work::{Work, WorkContext};
use gantry_core::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info, warn};

struct Running {
    work: Work,
    handle: JoinHandle<()>,
}

pub struct AgentController {
    context: WorkContext,
    ping_interval: Duration,
    work_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl AgentController {
    pub fn new(config: &AgentConfig, context: WorkContext) -> Self {
        Self {
            context,
            ping_interval: config.ping_interval(),
            work_interval: config.work_interval(),
            running: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &WorkContext {
        &self.context
    }

    /// Obtains a session cookie from the server.
    pub async fn register(&self) -> Result<()> {
        let info = self.context.runtime_info();
        let remote = self.context.remote.clone();
        let cookie = blocking(move || remote.get_cookie(&info)).await?;

        let mut runtime = self.context.runtime.lock();
        runtime.set_cookie(cookie);
        info!(agent_uuid = %runtime.uuid(), "Agent registered");
        Ok(())
    }

    pub async fn ping(&self) -> Result<AgentInstruction> {
        let info = self.context.runtime_info();
        let remote = self.context.remote.clone();
        let instruction = blocking(move || remote.ping(&info)).await?;

        match instruction {
            AgentInstruction::None => debug!("Ping acknowledged"),
            AgentInstruction::Cancel => {
                info!("Server asked to cancel the current build");
                self.cancel_current();
            }
            AgentInstruction::Reregister => {
                warn!("Server asked the agent to re-register");
                self.reregister().await?;
            }
        }
        Ok(instruction)
    }

    async fn reregister(&self) -> Result<()> {
        let mut info = self.context.runtime_info();
        info.clear_cookie();
        let remote = self.context.remote.clone();
        let cookie = blocking(move || remote.get_cookie(&info)).await?;

        self.context.runtime.lock().set_cookie(cookie);
        info!("Agent re-registered");
        Ok(())
    }

    /// Polls for one unit of work unless a build is still running.
    pub async fn retrieve_work(&self) -> Result<()> {
        if self.is_busy() {
            return Ok(());
        }
        let info = self.context.runtime_info();
        let remote = self.context.remote.clone();
        let work = blocking(move || remote.get_work(&info)).await?;
        self.assign(work).await;
        Ok(())
    }

    /// Starts `work`. A build still in progress is cancelled and awaited
    /// first, so at most one build runs at a time.
    pub async fn assign(&self, work: Work) {
        if !work.is_build() {
            if let Err(e) = work.do_work(&self.context) {
                warn!(work = %work.description(), error = %e, "Work rejected");
            }
            return;
        }

        let previous = self.running.lock().take();
        if let Some(previous) = previous {
            if !previous.handle.is_finished() {
                info!(work = %previous.work.description(), "New assignment, cancelling current work");
                previous.work.cancel(&self.context);
            }
            if let Err(e) = previous.handle.await {
                error!(error = %e, "Build thread failed");
            }
        }

        info!(work = %work.description(), "Starting work");
        let context = self.context.clone();
        let job = work.clone();
        let handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = job.do_work(&context) {
                error!(work = %job.description(), error = %e, "Work failed");
            }
        });
        *self.running.lock() = Some(Running { work, handle });
    }

    pub fn cancel_current(&self) {
        if let Some(running) = self.running.lock().as_ref()
            && !running.handle.is_finished()
        {
            running.work.cancel(&self.context);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Waits for the current build, if any, to finish.
    pub async fn wait_for_current(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running
            && let Err(e) = running.handle.await
        {
            error!(error = %e, "Build thread failed");
        }
    }

    /// Run the agent until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ping_ticker = interval(self.ping_interval);
        let mut work_ticker = interval(self.work_interval);

        info!(
            agent_uuid = %self.context.runtime.lock().uuid(),
            ping_secs = self.ping_interval.as_secs(),
            "Starting agent controller"
        );

        loop {
            tokio::select! {
                _ = ping_ticker.tick() => {
                    if self.context.runtime.lock().cookie().is_none() {
                        if let Err(e) = self.register().await {
                            warn!(error = %e, "Registration failed, will retry");
                        }
                        continue;
                    }
                    if let Err(e) = self.ping().await {
                        warn!(error = %e, "Ping failed");
                    }
                }
                _ = work_ticker.tick() => {
                    if self.context.runtime.lock().cookie().is_none() {
                        continue;
                    }
                    if let Err(e) = self.retrieve_work().await {
                        warn!(error = %e, "Failed to retrieve work");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Agent controller shutting down");
                        self.cancel_current();
                        self.wait_for_current().await;
                        break;
                    }
                }
            }
        }
    }
}

async fn blocking<T, F>(call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| Error::Internal(format!("Blocking call failed: {}", e)))?
}
