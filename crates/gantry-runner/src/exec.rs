//! Host process execution for exec builders.

use crate::builders::CancelFlag;
use gantry_core::env::{EnvironmentVariableContext, mask_secrets};
use gantry_core::ports::ConsoleOut;
use gantry_core::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Runs `command` to completion, streaming stdout and stderr to `console`
/// with secure values masked. Once `cancel` is raised the child's whole
/// process group is killed and the call returns without draining its pipes.
///
/// Must be called from a blocking thread; the process is driven on `runtime`.
pub fn run_command(
    runtime: &Handle,
    command: &str,
    args: &[String],
    working_dir: &Path,
    environment: &EnvironmentVariableContext,
    console: &dyn ConsoleOut,
    cancel: &CancelFlag,
) -> Result<()> {
    info!(command = %command, dir = %working_dir.display(), "Executing command");

    if !working_dir.is_dir() {
        return Err(Error::TaskFailed(format!(
            "Working directory \"{}\" is not a directory",
            working_dir.display()
        )));
    }

    runtime.block_on(drive(command, args, working_dir, environment, console, cancel))
}

async fn drive(
    command: &str,
    args: &[String],
    working_dir: &Path,
    environment: &EnvironmentVariableContext,
    console: &dyn ConsoleOut,
    cancel: &CancelFlag,
) -> Result<()> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(working_dir)
        .envs(environment.to_env_pairs())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own group, so cancellation reaches anything the command forks.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::TaskFailed(format!("Failed to start '{}': {}", command, e)))?;
    // Taken now: the id is gone once the child is reaped, the group is not.
    let group = child.id();

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
    }
    drop(tx);

    let secrets = environment.secure_values();
    let mut status = None;
    let mut streaming = true;

    while status.is_none() || streaming {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!(command = %command, "Killing cancelled command");
                kill_process_group(&mut child, group).await;
                for reader in &readers {
                    reader.abort();
                }
                return Err(Error::Cancelled);
            }
            line = rx.recv(), if streaming => match line {
                Some(line) => console.consume_line(&mask_secrets(&line, &secrets)),
                None => streaming = false,
            },
            exit = child.wait(), if status.is_none() => {
                status = Some(exit?);
            }
        }
    }

    let Some(status) = status else {
        return Err(Error::Internal(format!("'{}' produced no exit status", command)));
    };
    debug!(command = %command, code = ?status.code(), "Command finished");

    if status.success() {
        Ok(())
    } else {
        Err(Error::TaskFailed(format!(
            "'{}' exited with code {}",
            command,
            status.code().unwrap_or(-1)
        )))
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

async fn kill_process_group(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            debug!(pgid, error = %e, "Failed to signal process group");
        }
    }
    #[cfg(not(unix))]
    let _ = group;
    let _ = child.kill().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl ConsoleOut for Lines {
        fn consume_line(&self, line: &str) {
            self.0.lock().push(line.to_string());
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn cancel_after(cancel: &CancelFlag, delay: Duration) -> std::thread::JoinHandle<()> {
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            trigger.cancel();
        })
    }

    #[test]
    fn streams_output_with_secrets_masked() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let mut env = EnvironmentVariableContext::new();
        env.set_property("TOKEN", "s3cret", true);
        let console = Lines::default();

        run_command(
            rt.handle(),
            "sh",
            &sh("echo token=$TOKEN"),
            dir.path(),
            &env,
            &console,
            &CancelFlag::default(),
        )
        .unwrap();

        assert_eq!(*console.0.lock(), vec!["token=******".to_string()]);
    }

    #[test]
    fn output_written_just_before_exit_is_not_lost() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let console = Lines::default();

        run_command(
            rt.handle(),
            "sh",
            &sh("echo one; echo two; echo three 1>&2"),
            dir.path(),
            &EnvironmentVariableContext::new(),
            &console,
            &CancelFlag::default(),
        )
        .unwrap();

        let mut lines = console.0.lock().clone();
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[test]
    fn non_zero_exit_is_a_task_failure() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let err = run_command(
            rt.handle(),
            "sh",
            &sh("exit 3"),
            dir.path(),
            &EnvironmentVariableContext::new(),
            &Lines::default(),
            &CancelFlag::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TaskFailed(msg) if msg.contains("code 3")));
    }

    #[test]
    fn cancellation_kills_the_child() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::default();
        let trigger = cancel_after(&cancel, Duration::from_millis(200));

        let started = Instant::now();
        let err = run_command(
            rt.handle(),
            "sleep",
            &["30".to_string()],
            dir.path(),
            &EnvironmentVariableContext::new(),
            &Lines::default(),
            &cancel,
        )
        .unwrap_err();
        trigger.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn cancellation_does_not_wait_for_grandchildren_holding_the_pipes() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::default();
        let trigger = cancel_after(&cancel, Duration::from_millis(200));
        let console = Lines::default();

        let started = Instant::now();
        let err = run_command(
            rt.handle(),
            "sh",
            &sh("sleep 6; echo done"),
            dir.path(),
            &EnvironmentVariableContext::new(),
            &console,
            &cancel,
        )
        .unwrap_err();
        trigger.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(console.0.lock().is_empty());
    }

    #[test]
    fn already_cancelled_flag_never_waits_for_the_command() {
        let rt = Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::default();
        cancel.cancel();

        let started = Instant::now();
        let err = run_command(
            rt.handle(),
            "sleep",
            &["30".to_string()],
            dir.path(),
            &EnvironmentVariableContext::new(),
            &Lines::default(),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
