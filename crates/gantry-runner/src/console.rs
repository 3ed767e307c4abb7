//! Job console output: buffering, shipping to the server and masking.

use chrono::Local;
use gantry_core::env::mask_secrets;
use gantry_core::plan::JobIdentifier;
use gantry_core::ports::{ConsoleOut, ConsoleUploader};
use gantry_core::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, warn};

type Lines = Arc<Mutex<Vec<String>>>;

/// Buffers console lines and uploads them from a runtime task on a fixed
/// interval. Producers only ever enqueue. Lines are delivered in the order
/// they were consumed; a failed upload is retried on the next flush.
pub struct ConsoleTransmitter {
    lines: Lines,
    shutdown: watch::Sender<bool>,
    runtime: Handle,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleTransmitter {
    pub fn start(
        runtime: &Handle,
        uploader: Arc<dyn ConsoleUploader>,
        job: JobIdentifier,
        period: Duration,
    ) -> Self {
        let lines = Lines::default();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let flusher = runtime.spawn(flush_loop(
            Arc::clone(&lines),
            uploader,
            job,
            period,
            shutdown_rx,
        ));

        Self {
            lines,
            shutdown,
            runtime: runtime.clone(),
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// Flushes whatever is buffered and waits for the flusher to finish.
    /// Calling it again is a no-op. Must not be called from async code.
    pub fn stop(&self) {
        let Some(handle) = self.flusher.lock().take() else {
            return;
        };
        self.shutdown.send_replace(true);
        if let Err(e) = self.runtime.block_on(handle) {
            warn!(error = %e, "Console flusher failed");
        }
    }
}

impl ConsoleOut for ConsoleTransmitter {
    fn consume_line(&self, line: &str) {
        let stamped = format!("{} {}", Local::now().format("%H:%M:%S%.3f"), line);
        self.lines.lock().push(stamped);
    }
}

impl Drop for ConsoleTransmitter {
    fn drop(&mut self) {
        // Not joined here: the flusher still does its final flush.
        self.shutdown.send_replace(true);
    }
}

async fn flush_loop(
    lines: Lines,
    uploader: Arc<dyn ConsoleUploader>,
    job: JobIdentifier,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.tick().await;

    loop {
        let stopping = tokio::select! {
            _ = ticker.tick() => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        };

        flush(&lines, &uploader, &job, stopping).await;

        if stopping {
            debug!(job = %job, "Console flusher stopped");
            break;
        }
    }
}

async fn flush(lines: &Lines, uploader: &Arc<dyn ConsoleUploader>, job: &JobIdentifier, stopping: bool) {
    let batch = std::mem::take(&mut *lines.lock());
    if batch.is_empty() {
        return;
    }

    let mut content = batch.join("\n");
    content.push('\n');
    let upload = {
        let uploader = Arc::clone(uploader);
        let job = job.clone();
        tokio::task::spawn_blocking(move || uploader.upload(&job, &content))
    };
    let result = upload
        .await
        .unwrap_or_else(|e| Err(Error::Internal(format!("Console upload aborted: {}", e))));

    match result {
        Ok(()) => debug!(job = %job, lines = batch.len(), "Console flushed"),
        Err(e) if stopping => {
            warn!(job = %job, error = %e, lines = batch.len(), "Final console upload failed");
        }
        Err(e) => {
            warn!(job = %job, error = %e, "Console upload failed, will retry");
            lines.lock().splice(0..0, batch);
        }
    }
}

/// Replaces secure values in every line before passing it on.
pub struct MaskingConsole<'a> {
    inner: &'a dyn ConsoleOut,
    secrets: Vec<String>,
}

impl<'a> MaskingConsole<'a> {
    pub fn new(inner: &'a dyn ConsoleOut, secrets: Vec<String>) -> Self {
        Self { inner, secrets }
    }
}

impl ConsoleOut for MaskingConsole<'_> {
    fn consume_line(&self, line: &str) {
        self.inner.consume_line(&mask_secrets(line, &self.secrets));
    }
}
