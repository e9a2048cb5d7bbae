//! Sleep/wake notifications from systemd-logind.
//!
//! logind broadcasts `org.freedesktop.login1.Manager.PrepareForSleep(b)` on
//! the system bus: `true` just before suspend, `false` after resume. The
//! monitor runs `dbus-monitor --system` with a match rule for that signal and
//! maps the boolean argument lines of its output.

use std::process::Stdio;

use tracing::info;

use crate::BoxFuture;

use super::{PowerEvent, PowerEventSource, Subscription, SubscriptionError, spawn_line_worker};

/// Match rule selecting logind's sleep signal.
pub const PREPARE_FOR_SLEEP_RULE: &str =
    "type='signal',interface='org.freedesktop.login1.Manager',member='PrepareForSleep'";

/// Map one line of `dbus-monitor` output to an event.
pub fn parse_monitor_line(line: &str) -> Option<PowerEvent> {
    match line.trim() {
        "boolean true" => Some(PowerEvent::Sleep),
        "boolean false" => Some(PowerEvent::Wake),
        _ => None,
    }
}

/// Power event source backed by a `dbus-monitor` child process.
///
/// The child is owned by the subscription worker and killed when the worker
/// is aborted on unsubscribe.
pub struct LogindMonitor {
    program: String,
}

impl LogindMonitor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args() -> [&'static str; 3] {
        ["--system", "--monitor", PREPARE_FOR_SLEEP_RULE]
    }
}

impl PowerEventSource for LogindMonitor {
    fn name(&self) -> &str {
        "logind"
    }

    fn subscribe(&mut self) -> BoxFuture<'_, Result<Subscription, SubscriptionError>> {
        Box::pin(async move {
            let mut child = tokio::process::Command::new(&self.program)
                .args(Self::args())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| SubscriptionError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| SubscriptionError::NoOutput(self.program.clone()))?;

            let (rx, worker) =
                spawn_line_worker("logind".to_string(), stdout, parse_monitor_line, child);

            info!(program = %self.program, "Power notifications registered with logind");
            Ok(Subscription::new("logind", rx, Some(worker)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_monitor_line() {
        assert_eq!(parse_monitor_line("   boolean true"), Some(PowerEvent::Sleep));
        assert_eq!(parse_monitor_line("   boolean false"), Some(PowerEvent::Wake));
        assert_eq!(
            parse_monitor_line(
                "signal time=1700000000.1 sender=:1.2 -> destination=(null destination) \
                 serial=9 path=/org/freedesktop/login1; \
                 interface=org.freedesktop.login1.Manager; member=PrepareForSleep"
            ),
            None
        );
        assert_eq!(parse_monitor_line("   string \":1.42\""), None);
    }

    #[tokio::test]
    async fn test_missing_monitor_program_fails_subscription() {
        let mut monitor = LogindMonitor::new("/nonexistent/dbus-monitor");
        let err = monitor.subscribe().await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_monitor_output_is_forwarded() {
        // Stand in for dbus-monitor with a script printing the same lines.
        let tmp = tempfile::TempDir::new().unwrap();
        let script = tmp.path().join("fake-monitor");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'signal member=PrepareForSleep'\necho '   boolean true'\necho '   boolean false'\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut monitor = LogindMonitor::new(script.display().to_string());
        let mut sub = monitor.subscribe().await.unwrap();
        assert_eq!(sub.next().await, Some(PowerEvent::Sleep));
        assert_eq!(sub.next().await, Some(PowerEvent::Wake));
        assert_eq!(sub.next().await, None);
        sub.unsubscribe().await;
    }
}
