//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use radiosleep_config::{AppConfig, RadioStrategyConfig};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .runtime_dir(tmp.path())
///     .grace_period_ms(50)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Place the pid and log files inside `dir`.
    pub fn runtime_dir(mut self, dir: &Path) -> Self {
        self.config.daemon.pid_file = dir.join("radiosleep.pid").display().to_string();
        self.config.daemon.log_file = dir.join("radiosleep.log").display().to_string();
        self
    }

    pub fn stop_timeout_ms(mut self, ms: u64) -> Self {
        self.config.daemon.stop_timeout_ms = ms;
        self
    }

    pub fn grace_period_ms(mut self, ms: u64) -> Self {
        self.config.debounce.grace_period_ms = ms;
        self
    }

    pub fn stabilization_ms(mut self, ms: u64) -> Self {
        self.config.debounce.stabilization_ms = ms;
        self
    }

    pub fn event_source(mut self, source: &str) -> Self {
        self.config.events.source = source.to_string();
        self
    }

    /// Use `status` as the status command and replace the strategy list with
    /// a single strategy.
    pub fn radio_commands(mut self, status: &[&str], enable: &[&str], disable: &[&str]) -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.config.radio.status_command = argv(status);
        self.config.radio.strategies = vec![RadioStrategyConfig {
            name: "test".to_string(),
            enable: argv(enable),
            disable: argv(disable),
        }];
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
