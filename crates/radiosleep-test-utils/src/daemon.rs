//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real [`Daemon`] on the current runtime with a
//! [`MockRadio`], a scripted event source, and its instance record inside an
//! owned temp directory.

use std::path::PathBuf;
use std::time::Duration;

use radiosleep_config::AppConfig;
use radiosleep_core::{Daemon, DaemonError, DebounceStatus, ShutdownHandle};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::events::{EventInjector, scripted_source};
use crate::radio::MockRadio;

/// A running test-scoped daemon.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestDaemon {
    pub radio: MockRadio,
    pub events: EventInjector,
    pub config: AppConfig,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<DebounceStatus, DaemonError>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon from `builder` (its runtime dir is replaced by a temp
    /// dir) and wait until it has written its instance record.
    pub async fn start(builder: TestConfigBuilder, radio: MockRadio) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = builder.runtime_dir(temp_dir.path()).build();
        let (source, events) = scripted_source();

        let daemon = Daemon::new(config.clone(), radio.handle(), Box::new(source));
        let shutdown = daemon.shutdown_handle();
        let task = tokio::spawn(daemon.run());

        let fixture = Self {
            radio,
            events,
            config,
            shutdown,
            task,
            _temp_dir: temp_dir,
        };
        fixture.wait_for_record().await;
        fixture
    }

    /// Start with default settings and a radio that is powered on.
    pub async fn default_config() -> Self {
        Self::start(TestConfigBuilder::new(), MockRadio::enabled()).await
    }

    pub fn pid_path(&self) -> PathBuf {
        self.config.daemon.pid_path()
    }

    async fn wait_for_record(&self) {
        let path = self.pid_path();
        for _ in 0..400 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("daemon did not write {}", path.display());
    }

    /// Trigger a graceful shutdown and return the daemon's result.
    pub async fn stop(self) -> Result<DebounceStatus, DaemonError> {
        self.shutdown.trigger();
        self.task.await.expect("daemon task panicked")
    }
}
