#![deny(unsafe_code)]

//! Configuration loading and validation for radiosleep.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon process and instance record configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Sleep/wake debounce timings.
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// Power event source configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Radio power capability configuration.
    #[serde(default)]
    pub radio: RadioConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the daemon process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Instance record holding the running daemon's PID as plain text.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,

    /// Append-only diagnostic log written by the daemon.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// How long `stop` waits for a graceful exit before sending SIGKILL.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// How long `start` waits for the spawned daemon to publish its record.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            log_file: default_log_file(),
            stop_timeout_ms: default_stop_timeout_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl DaemonConfig {
    pub fn pid_path(&self) -> PathBuf {
        PathBuf::from(&self.pid_file)
    }

    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.log_file)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

/// Runtime directory for the record and log, falling back to the temp dir
/// on platforms without `XDG_RUNTIME_DIR`.
fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

fn default_pid_file() -> String {
    runtime_dir().join("radiosleep.pid").display().to_string()
}

fn default_log_file() -> String {
    runtime_dir().join("radiosleep.log").display().to_string()
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

fn default_startup_timeout_ms() -> u64 {
    1000
}

/// Sleep/wake debounce timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Delay after a sleep notification before the radio is disabled.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Delay after a wake notification before the enable check runs.
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            stabilization_ms: default_stabilization_ms(),
        }
    }
}

impl DebounceConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_stabilization_ms() -> u64 {
    2000
}

/// Where sleep/wake notifications come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Event source: "logind" (system bus monitor) or "stdin" (line protocol).
    #[serde(default = "default_events_source")]
    pub source: String,

    /// Program used to monitor the system bus for the logind source.
    #[serde(default = "default_monitor_program")]
    pub monitor_program: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            source: default_events_source(),
            monitor_program: default_monitor_program(),
        }
    }
}

fn default_events_source() -> String {
    "logind".to_string()
}

fn default_monitor_program() -> String {
    "dbus-monitor".to_string()
}

/// Radio power capability configuration.
///
/// The power state is read by running `status_command` and looking for
/// `enabled_pattern` in its stdout. Toggling tries each strategy in order
/// until one succeeds.
///
/// ## TOML Example
///
/// ```toml
/// [radio]
/// status_command = ["bluetoothctl", "show"]
/// enabled_pattern = "Powered: yes"
///
/// [[radio.strategies]]
/// name = "bluetoothctl"
/// enable = ["bluetoothctl", "power", "on"]
/// disable = ["bluetoothctl", "power", "off"]
///
/// [[radio.strategies]]
/// name = "rfkill"
/// enable = ["rfkill", "unblock", "bluetooth"]
/// disable = ["rfkill", "block", "bluetooth"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Command whose stdout reports the current power state.
    #[serde(default = "default_status_command")]
    pub status_command: Vec<String>,

    /// Substring of the status output meaning "enabled".
    #[serde(default = "default_enabled_pattern")]
    pub enabled_pattern: String,

    /// Per-command timeout in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Toggle strategies, tried in order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<RadioStrategyConfig>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            status_command: default_status_command(),
            enabled_pattern: default_enabled_pattern(),
            command_timeout_ms: default_command_timeout_ms(),
            strategies: default_strategies(),
        }
    }
}

impl RadioConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// A single toggle strategy as expressed in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStrategyConfig {
    /// Name used in logs.
    pub name: String,
    /// argv that powers the radio on.
    pub enable: Vec<String>,
    /// argv that powers the radio off.
    pub disable: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_status_command() -> Vec<String> {
    argv(&["bluetoothctl", "show"])
}

fn default_enabled_pattern() -> String {
    "Powered: yes".to_string()
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_strategies() -> Vec<RadioStrategyConfig> {
    vec![
        RadioStrategyConfig {
            name: "bluetoothctl".to_string(),
            enable: argv(&["bluetoothctl", "power", "on"]),
            disable: argv(&["bluetoothctl", "power", "off"]),
        },
        RadioStrategyConfig {
            name: "rfkill".to_string(),
            enable: argv(&["rfkill", "unblock", "bluetooth"]),
            disable: argv(&["rfkill", "block", "bluetooth"]),
        },
    ]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.pid_file.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.pid_file must not be empty".to_string(),
            ));
        }
        if self.daemon.log_file.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.log_file must not be empty".to_string(),
            ));
        }
        if self.daemon.stop_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "daemon.stop_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.daemon.startup_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "daemon.startup_timeout_ms must be non-zero".to_string(),
            ));
        }

        if self.debounce.grace_period_ms == 0 {
            return Err(ConfigError::Validation(
                "debounce.grace_period_ms must be non-zero".to_string(),
            ));
        }

        let valid_sources = ["logind", "stdin"];
        if !valid_sources.contains(&self.events.source.as_str()) {
            return Err(ConfigError::Validation(format!(
                "events.source must be one of {:?}, got {:?}",
                valid_sources, self.events.source
            )));
        }
        if self.events.source == "logind" && self.events.monitor_program.is_empty() {
            return Err(ConfigError::Validation(
                "events.monitor_program must not be empty for the logind source".to_string(),
            ));
        }

        if self.radio.status_command.is_empty() {
            return Err(ConfigError::Validation(
                "radio.status_command must not be empty".to_string(),
            ));
        }
        if self.radio.enabled_pattern.is_empty() {
            return Err(ConfigError::Validation(
                "radio.enabled_pattern must not be empty".to_string(),
            ));
        }
        if self.radio.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "radio.command_timeout_ms must be non-zero".to_string(),
            ));
        }
        for (i, strategy) in self.radio.strategies.iter().enumerate() {
            if strategy.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "radio.strategies[{i}].name must not be empty"
                )));
            }
            if strategy.enable.is_empty() || strategy.disable.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "radio.strategies[{i}] ({}) needs both enable and disable commands",
                    strategy.name
                )));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.debounce.grace_period(), Duration::from_secs(5));
        assert_eq!(config.debounce.stabilization_delay(), Duration::from_secs(2));
        assert_eq!(config.events.source, "logind");
        assert_eq!(config.logging.level, "info");
        assert!(config.daemon.pid_file.ends_with("radiosleep.pid"));
        assert!(config.daemon.log_file.ends_with("radiosleep.log"));
        assert_eq!(config.radio.strategies.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.debounce.grace_period_ms, 5000);
        assert_eq!(config.radio.enabled_pattern, "Powered: yes");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [daemon]
            pid_file = "/tmp/rs/radiosleep.pid"
            log_file = "/tmp/rs/radiosleep.log"
            stop_timeout_ms = 2500

            [debounce]
            grace_period_ms = 10000
            stabilization_ms = 0

            [events]
            source = "stdin"

            [radio]
            status_command = ["cat", "/sys/class/bluetooth/hci0/power"]
            enabled_pattern = "on"

            [[radio.strategies]]
            name = "rfkill"
            enable = ["rfkill", "unblock", "bluetooth"]
            disable = ["rfkill", "block", "bluetooth"]

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.daemon.pid_path(), PathBuf::from("/tmp/rs/radiosleep.pid"));
        assert_eq!(config.daemon.stop_timeout(), Duration::from_millis(2500));
        assert_eq!(config.debounce.grace_period(), Duration::from_secs(10));
        assert_eq!(config.debounce.stabilization_delay(), Duration::ZERO);
        assert_eq!(config.events.source, "stdin");
        assert_eq!(config.radio.enabled_pattern, "on");
        assert_eq!(
            config.radio.strategies,
            vec![RadioStrategyConfig {
                name: "rfkill".to_string(),
                enable: argv(&["rfkill", "unblock", "bluetooth"]),
                disable: argv(&["rfkill", "block", "bluetooth"]),
            }]
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_grace_period() {
        let toml = r#"
            [debounce]
            grace_period_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_pid_file() {
        let toml = r#"
            [daemon]
            pid_file = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_stop_timeout() {
        let toml = r#"
            [daemon]
            stop_timeout_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_source() {
        let toml = r#"
            [events]
            source = "upower"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_status_command() {
        let toml = r#"
            [radio]
            status_command = []
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_strategy_without_disable() {
        let toml = r#"
            [[radio.strategies]]
            name = "half"
            enable = ["true"]
            disable = []
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("half"));
    }

    #[test]
    fn test_empty_strategy_list_is_allowed() {
        let toml = r#"
            [radio]
            strategies = []
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert!(config.radio.strategies.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("radiosleep.toml");
        tokio::fs::write(&path, b"[debounce]\ngrace_period_ms = 750\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.debounce.grace_period(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[")
            .await
            .unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }

    #[test]
    fn test_config_serializes_back_to_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed = AppConfig::parse(&rendered).unwrap();
        assert_eq!(reparsed.daemon.pid_file, config.daemon.pid_file);
        assert_eq!(reparsed.radio.strategies, config.radio.strategies);
    }
}
