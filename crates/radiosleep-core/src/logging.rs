//! Diagnostic log setup.
//!
//! The daemon writes every event twice: to stderr for foreground runs, and
//! appended to the configured log file as timestamped plain-text lines for
//! detached runs and later inspection.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Levels in increasing verbosity.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Errors from installing the log pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// The filter directive for a configured level raised by `-v` flags.
///
/// Each `-v` raises the level one step; it never lowers it.
pub fn filter_directive(level: &str, verbosity: u8) -> String {
    let base = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(level))
        .unwrap_or(2);
    let raised = (base + usize::from(verbosity)).min(LEVELS.len() - 1);
    LEVELS[raised].to_string()
}

/// Open `path` for appending, creating it and its parent directory.
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    let open_err = |source| LoggingError::Open {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(open_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_err)
}

/// A `fmt` layer writing one timestamped line per event to `file`.
pub fn file_layer<S>(file: File) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level raised by
/// `verbosity`. With `log_file` the diagnostic log is appended to as well.
pub fn init(level: &str, log_file: Option<&Path>, verbosity: u8) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level, verbosity)));
    let file = log_file.map(open_log_file).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file.map(|f| file_layer(f)))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("info", 0), "info");
        assert_eq!(filter_directive("info", 1), "debug");
        assert_eq!(filter_directive("info", 2), "trace");
        assert_eq!(filter_directive("warn", 1), "info");
        assert_eq!(filter_directive("trace", 3), "trace");
        assert_eq!(filter_directive("WARN", 0), "warn");
        // Unknown levels fall back to info.
        assert_eq!(filter_directive("loud", 0), "info");
    }

    #[test]
    fn test_file_layer_appends_timestamped_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs/radiosleep.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "earlier line\n").unwrap();

        let file = open_log_file(&path).unwrap();
        {
            let _guard = tracing_subscriber::registry()
                .with(file_layer(file))
                .set_default();
            tracing::info!(pid = 42, "Sleep detected");
            tracing::warn!("Radio toggle failed");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "earlier line");
        assert!(lines[1].contains("INFO"));
        assert!(lines[1].contains("Sleep detected"));
        assert!(lines[1].contains("pid=42"));
        assert!(lines[2].contains("WARN"));
        // Timestamp prefix, no escape codes.
        assert!(lines[1].starts_with(|c: char| c.is_ascii_digit()));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a/b/radiosleep.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
