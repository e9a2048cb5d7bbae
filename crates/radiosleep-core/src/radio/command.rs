//! External-utility radio strategy and power probe.
//!
//! Both run an argv directly (no shell) via `tokio::process`, bounded by a
//! timeout. A timed-out child is killed when its future is dropped.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

use crate::BoxFuture;

use super::{Power, PowerProbe, RadioError, RadioStrategy};

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `argv` to completion, failing on spawn error, timeout, or non-zero exit.
pub async fn run_command(argv: &[String], timeout: Duration) -> Result<CommandOutput, RadioError> {
    let (program, args) = argv.split_first().ok_or(RadioError::EmptyCommand)?;
    debug!(program = %program, args = ?args, "Executing radio command");

    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RadioError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(RadioError::Spawn {
                program: program.clone(),
                source,
            });
        }
        Err(_) => {
            return Err(RadioError::Timeout {
                program: program.clone(),
                after: timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        return Err(RadioError::CommandFailed {
            program: program.clone(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Whether `program` resolves to an executable, either as a path or via `PATH`.
fn resolvable(program: &str) -> bool {
    if program.contains('/') {
        Path::new(program).is_file()
    } else {
        which::which(program).is_ok()
    }
}

/// Toggle strategy backed by a pair of external commands.
#[derive(Debug, Clone)]
pub struct CommandStrategy {
    name: String,
    enable: Vec<String>,
    disable: Vec<String>,
    timeout: Duration,
}

impl CommandStrategy {
    pub fn new(name: String, enable: Vec<String>, disable: Vec<String>, timeout: Duration) -> Self {
        Self {
            name,
            enable,
            disable,
            timeout,
        }
    }
}

impl RadioStrategy for CommandStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        let programs = [self.enable.first(), self.disable.first()];
        programs.into_iter().all(|p| p.is_some_and(|p| resolvable(p)))
    }

    fn set_power(&self, power: Power) -> BoxFuture<'_, Result<(), RadioError>> {
        let argv = match power {
            Power::On => &self.enable,
            Power::Off => &self.disable,
        };
        Box::pin(async move {
            let output = run_command(argv, self.timeout).await?;
            if !output.stderr.is_empty() {
                debug!(strategy = %self.name, stderr = %output.stderr, "Radio command wrote to stderr");
            }
            Ok(())
        })
    }
}

/// Power probe that runs a status command and looks for a pattern in stdout.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    argv: Vec<String>,
    pattern: String,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(argv: Vec<String>, pattern: String, timeout: Duration) -> Self {
        Self {
            argv,
            pattern,
            timeout,
        }
    }
}

impl PowerProbe for CommandProbe {
    /// A failing status command reads as "not enabled".
    fn is_enabled(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match run_command(&self.argv, self.timeout).await {
                Ok(output) => output.stdout.contains(&self.pattern),
                Err(e) => {
                    warn!(error = %e, "Radio status query failed, assuming disabled");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let output = run_command(&argv(&["echo", "Powered: yes"]), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "Powered: yes");
    }

    #[tokio::test]
    async fn test_run_command_reports_exit_code() {
        let err = run_command(&argv(&["sh", "-c", "echo busy >&2; exit 4"]), TIMEOUT)
            .await
            .unwrap_err();
        match err {
            RadioError::CommandFailed { program, code, stderr } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(4));
                assert_eq!(stderr, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let err = run_command(&argv(&["/nonexistent/radio-tool"]), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_command_empty_argv() {
        assert!(matches!(
            run_command(&[], TIMEOUT).await,
            Err(RadioError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let err = run_command(&argv(&["sleep", "5"]), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_strategy_switches_with_matching_command() {
        let strategy = CommandStrategy::new(
            "shell".to_string(),
            argv(&["true"]),
            argv(&["false"]),
            TIMEOUT,
        );
        assert!(strategy.available());
        assert!(strategy.set_power(Power::On).await.is_ok());
        assert!(strategy.set_power(Power::Off).await.is_err());
    }

    #[test]
    fn test_strategy_unavailable_when_program_missing() {
        let strategy = CommandStrategy::new(
            "ghost".to_string(),
            argv(&["radiosleep-no-such-tool", "on"]),
            argv(&["true"]),
            TIMEOUT,
        );
        assert!(!strategy.available());

        let by_path = CommandStrategy::new(
            "ghost-path".to_string(),
            argv(&["/nonexistent/tool"]),
            argv(&["/nonexistent/tool"]),
            TIMEOUT,
        );
        assert!(!by_path.available());
    }

    #[tokio::test]
    async fn test_probe_matches_pattern() {
        let on = CommandProbe::new(
            argv(&["echo", "Controller\n\tPowered: yes"]),
            "Powered: yes".to_string(),
            TIMEOUT,
        );
        assert!(on.is_enabled().await);

        let off = CommandProbe::new(
            argv(&["echo", "Powered: no"]),
            "Powered: yes".to_string(),
            TIMEOUT,
        );
        assert!(!off.is_enabled().await);
    }

    #[tokio::test]
    async fn test_probe_failure_reads_as_disabled() {
        let probe = CommandProbe::new(argv(&["false"]), "anything".to_string(), TIMEOUT);
        assert!(!probe.is_enabled().await);
    }
}
