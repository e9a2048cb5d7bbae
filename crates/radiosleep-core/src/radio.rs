//! Radio power capability.
//!
//! The debounce machine only ever sees [`RadioPower`]: a state query plus
//! enable/disable operations that may fail. How the radio is actually
//! switched is hidden behind it. [`FallbackRadio`] is the production
//! implementation: a [`PowerProbe`] for the query and an ordered list of
//! [`RadioStrategy`] values for toggling, tried in sequence until one
//! succeeds.
//!
//! ```text
//!   Debouncer ──► RadioPower
//!                   │
//!                   └─ FallbackRadio
//!                        ├─ PowerProbe      (status command + pattern)
//!                        └─ [RadioStrategy] (bluetoothctl, rfkill, ...)
//! ```

/// Command-backed strategy and probe.
pub mod command;

use std::time::Duration;

use tracing::{debug, info, warn};

use radiosleep_config::RadioConfig;

use crate::BoxFuture;

pub use command::{CommandProbe, CommandStrategy};

/// Errors from radio toggling.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("no radio strategy is available on this host")]
    NoStrategy,

    #[error("all radio strategies failed: {}", .0.join("; "))]
    AllStrategiesFailed(Vec<String>),
}

/// Requested radio power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Power::On => write!(f, "on"),
            Power::Off => write!(f, "off"),
        }
    }
}

/// The capability the daemon drives.
///
/// Implementations are neither instantaneous nor side-effect free. Callers
/// re-query [`is_enabled`](RadioPower::is_enabled) before every toggle and
/// never cache the answer.
pub trait RadioPower: Send + Sync {
    /// Current power state of the radio.
    fn is_enabled(&self) -> BoxFuture<'_, bool>;

    /// Power the radio on.
    fn enable(&self) -> BoxFuture<'_, Result<(), RadioError>>;

    /// Power the radio off.
    fn disable(&self) -> BoxFuture<'_, Result<(), RadioError>>;
}

/// Reads the radio's current power state.
pub trait PowerProbe: Send + Sync {
    fn is_enabled(&self) -> BoxFuture<'_, bool>;
}

/// One mechanism for switching the radio.
pub trait RadioStrategy: Send + Sync {
    /// Name used in logs (e.g. "bluetoothctl", "rfkill").
    fn name(&self) -> &str;

    /// Whether this mechanism can be attempted on this host.
    fn available(&self) -> bool;

    /// Switch the radio to the requested state.
    fn set_power(&self, power: Power) -> BoxFuture<'_, Result<(), RadioError>>;
}

/// Strategy list tried in order, first success wins.
pub struct FallbackRadio {
    probe: Box<dyn PowerProbe>,
    strategies: Vec<Box<dyn RadioStrategy>>,
}

impl FallbackRadio {
    pub fn new(probe: Box<dyn PowerProbe>, strategies: Vec<Box<dyn RadioStrategy>>) -> Self {
        Self { probe, strategies }
    }

    /// Build the command-backed probe and strategies described by `[radio]`.
    pub fn from_config(config: &RadioConfig) -> Self {
        let timeout = config.command_timeout();
        let probe = CommandProbe::new(
            config.status_command.clone(),
            config.enabled_pattern.clone(),
            timeout,
        );
        let strategies = config
            .strategies
            .iter()
            .map(|s| {
                Box::new(CommandStrategy::new(
                    s.name.clone(),
                    s.enable.clone(),
                    s.disable.clone(),
                    timeout,
                )) as Box<dyn RadioStrategy>
            })
            .collect();
        Self::new(Box::new(probe), strategies)
    }

    /// Names of the configured strategies, in trial order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    async fn toggle(&self, power: Power) -> Result<(), RadioError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            if !strategy.available() {
                debug!(strategy = strategy.name(), "Radio strategy unavailable, skipping");
                continue;
            }

            match strategy.set_power(power).await {
                Ok(()) => {
                    info!(strategy = strategy.name(), power = %power, "Radio switched");
                    return Ok(());
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), power = %power, error = %e, "Radio strategy failed");
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        if failures.is_empty() {
            Err(RadioError::NoStrategy)
        } else {
            Err(RadioError::AllStrategiesFailed(failures))
        }
    }
}

impl RadioPower for FallbackRadio {
    fn is_enabled(&self) -> BoxFuture<'_, bool> {
        self.probe.is_enabled()
    }

    fn enable(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        Box::pin(self.toggle(Power::On))
    }

    fn disable(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        Box::pin(self.toggle(Power::Off))
    }
}
