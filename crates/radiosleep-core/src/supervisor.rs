//! Lifecycle controller operations.
//!
//! These run in the CLI process, never in the daemon. They only rely on the
//! daemon's external contract: the instance record holds its pid, and
//! SIGTERM triggers a graceful shutdown that removes the record.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::instance::{self, InstanceError, InstanceStatus};

/// Interval between record/liveness polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from controlling a daemon process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("daemon did not start: {0}")]
    DidNotStart(String),

    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

/// How a `stop` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited after SIGTERM within the timeout.
    Graceful { pid: u32 },
    /// Did not exit in time and was sent SIGKILL; the record was removed.
    Killed { pid: u32 },
}

/// Current daemon status. A stale record is removed as a side effect.
pub fn status(pid_path: &Path) -> Result<InstanceStatus, SupervisorError> {
    Ok(instance::clear_stale(pid_path)?)
}

fn send(pid: u32, signal: Signal) -> Result<(), SupervisorError> {
    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        signal,
        source: Errno::EINVAL,
    })?;
    kill(Pid::from_raw(raw), signal).map_err(|source| SupervisorError::Signal {
        pid,
        signal,
        source,
    })
}

/// Whether `pid` has gone away, judged by either the record or the process.
fn has_exited(pid_path: &Path, pid: u32) -> bool {
    instance::read_pid(pid_path) != Some(pid) || !instance::is_alive(pid)
}

/// Send SIGTERM and wait up to `timeout` for the daemon to exit; escalate to
/// SIGKILL and remove the record if it does not.
pub async fn stop(pid_path: &Path, timeout: Duration) -> Result<StopOutcome, SupervisorError> {
    let pid = match status(pid_path)? {
        InstanceStatus::Running { pid } => pid,
        InstanceStatus::Stale { .. } | InstanceStatus::NotRunning => {
            return Err(SupervisorError::NotRunning);
        }
    };

    info!(pid = %pid, "Sending SIGTERM to daemon");
    match send(pid, Signal::SIGTERM) {
        Ok(()) => {}
        // Exited between the probe and the signal.
        Err(SupervisorError::Signal {
            source: Errno::ESRCH,
            ..
        }) => return Ok(StopOutcome::Graceful { pid }),
        Err(e) => return Err(e),
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if has_exited(pid_path, pid) {
            info!(pid = %pid, "Daemon stopped");
            return Ok(StopOutcome::Graceful { pid });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if has_exited(pid_path, pid) {
        return Ok(StopOutcome::Graceful { pid });
    }

    warn!(pid = %pid, timeout_ms = timeout.as_millis() as u64, "Daemon did not exit, sending SIGKILL");
    match send(pid, Signal::SIGKILL) {
        Ok(())
        | Err(SupervisorError::Signal {
            source: Errno::ESRCH,
            ..
        }) => {}
        Err(e) => return Err(e),
    }
    if instance::remove_if_recorded(pid_path, pid)? {
        debug!(path = %pid_path.display(), "Removed record of killed daemon");
    }
    Ok(StopOutcome::Killed { pid })
}

/// Spawn `exe args..` detached in its own process group with null stdio,
/// then wait up to `timeout` for it to claim the record.
pub async fn start_detached(
    exe: &Path,
    args: &[String],
    pid_path: &Path,
    timeout: Duration,
) -> Result<StartOutcome, SupervisorError> {
    if let InstanceStatus::Running { pid } = status(pid_path)? {
        info!(pid = %pid, "Daemon already running");
        return Ok(StartOutcome::AlreadyRunning { pid });
    }

    let mut child = std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(SupervisorError::SpawnFailed)?;
    let pid = child.id();
    debug!(pid = %pid, exe = %exe.display(), "Spawned daemon process");

    let deadline = Instant::now() + timeout;
    loop {
        if instance::read_pid(pid_path) == Some(pid) {
            info!(pid = %pid, "Daemon started");
            return Ok(StartOutcome::Started { pid });
        }
        if let Some(exit) = child.try_wait()? {
            // A concurrent start may have won the race for the record.
            if let InstanceStatus::Running { pid: other } = instance::probe(pid_path) {
                return Ok(StartOutcome::AlreadyRunning { pid: other });
            }
            return Err(SupervisorError::DidNotStart(format!(
                "process exited with {exit}"
            )));
        }
        if Instant::now() >= deadline {
            return Err(SupervisorError::DidNotStart(format!(
                "no instance record after {} ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn pid_path(tmp: &TempDir) -> std::path::PathBuf {
        tmp.path().join("radiosleep.pid")
    }

    /// Spawn `script` under sh, reap it in the background, and wait for its
    /// first line of output.
    async fn spawn_reaped(script: &str) -> u32 {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));
        tokio::spawn(async move {
            let _ = child.wait().await;
            drop(lines);
        });
        pid
    }

    #[test]
    fn test_status_not_running() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(status(&pid_path(&tmp)).unwrap(), InstanceStatus::NotRunning);
    }

    #[test]
    fn test_status_removes_stale_record() {
        let tmp = TempDir::new().unwrap();
        let path = pid_path(&tmp);
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead = child.id();
        child.wait().unwrap();
        std::fs::write(&path, format!("{dead}\n")).unwrap();

        assert_eq!(status(&path).unwrap(), InstanceStatus::Stale { pid: dead });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stop_without_daemon() {
        let tmp = TempDir::new().unwrap();
        let err = stop(&pid_path(&tmp), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning));
    }

    #[tokio::test]
    async fn test_stop_graceful() {
        let tmp = TempDir::new().unwrap();
        let path = pid_path(&tmp);
        let pid = spawn_reaped("echo ready; exec sleep 30").await;
        std::fs::write(&path, format!("{pid}\n")).unwrap();

        let outcome = stop(&path, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, StopOutcome::Graceful { pid });
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let tmp = TempDir::new().unwrap();
        let path = pid_path(&tmp);
        // SIGTERM stays ignored across exec.
        let pid = spawn_reaped("trap '' TERM; echo ready; exec sleep 30").await;
        std::fs::write(&path, format!("{pid}\n")).unwrap();

        let outcome = stop(&path, Duration::from_millis(200)).await.unwrap();
        assert_eq!(outcome, StopOutcome::Killed { pid });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_start_detached_waits_for_record() {
        let tmp = TempDir::new().unwrap();
        let path = pid_path(&tmp);
        let script = format!("echo $$ > '{}'; exec sleep 30", path.display());

        let outcome = start_detached(
            Path::new("sh"),
            &["-c".to_string(), script],
            &path,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let StartOutcome::Started { pid } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(instance::read_pid(&path), Some(pid));

        // A second start sees the live instance.
        let again = start_detached(Path::new("sh"), &[], &path, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(again, StartOutcome::AlreadyRunning { pid });

        send(pid, Signal::SIGKILL).unwrap();
    }

    #[tokio::test]
    async fn test_start_detached_reports_early_exit() {
        let tmp = TempDir::new().unwrap();
        let err = start_detached(
            Path::new("false"),
            &[],
            &pid_path(&tmp),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SupervisorError::DidNotStart(_)));
    }

    #[tokio::test]
    async fn test_start_detached_missing_executable() {
        let tmp = TempDir::new().unwrap();
        let err = start_detached(
            Path::new("/nonexistent/radiosleep"),
            &[],
            &pid_path(&tmp),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed(_)));
    }
}
