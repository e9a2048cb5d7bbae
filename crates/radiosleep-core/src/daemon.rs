//! Core daemon process: startup, main event loop, and shutdown sequence.
//!
//! [`Daemon`] is the process-scoped context that owns the instance record,
//! the power-event subscription, and the debounce machine. Startup claims the
//! record before touching anything else, so a second launch fails without
//! side effects. Signal handlers are installed before the claim, so SIGTERM
//! or SIGINT during startup still takes the graceful path. Shutdown runs in a
//! fixed order: pending timers are cancelled, the record is removed, and the
//! subscription is released.

use std::sync::Arc;

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use radiosleep_config::AppConfig;

use crate::build_info;
use crate::debounce::{DebounceStatus, Debouncer};
use crate::events::{PowerEventSource, SubscriptionError};
use crate::instance::{InstanceError, InstanceLock};
use crate::radio::RadioPower;

/// Exit code for a launch that found a live instance.
pub const EXIT_ALREADY_RUNNING: u8 = 3;

/// Exit code for every other startup or runtime failure.
pub const EXIT_FAILURE: u8 = 1;

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Requests a graceful shutdown from outside the event loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(ShutdownSignal);
    }
}

/// The radiosleep daemon.
pub struct Daemon {
    config: AppConfig,
    radio: Arc<dyn RadioPower>,
    source: Box<dyn PowerEventSource>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    // Held from construction so a trigger before `run` is not lost.
    shutdown_rx: broadcast::Receiver<ShutdownSignal>,
}

impl Daemon {
    pub fn new(
        config: AppConfig,
        radio: Arc<dyn RadioPower>,
        source: Box<dyn PowerEventSource>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            radio,
            source,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// A cloneable handle that stops [`run`](Daemon::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Run until SIGTERM, SIGINT, a shutdown request, or the end of the
    /// event stream. Returns the debounce machine's final snapshot.
    pub async fn run(self) -> Result<DebounceStatus, DaemonError> {
        let Daemon {
            config,
            radio,
            mut source,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
        } = self;

        let mut signals = ShutdownSignals::install().map_err(|e| {
            error!(error = %e, "Failed to install signal handlers");
            DaemonError::Signal(e)
        })?;

        let lock = InstanceLock::acquire(config.daemon.pid_path())?;
        info!(
            version = %build_info::version_string(),
            pid = lock.pid(),
            source = source.name(),
            "radiosleep daemon starting"
        );

        let mut subscription = match source.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, source = source.name(), "Failed to register for power notifications");
                release_record(lock);
                return Err(DaemonError::Subscription(e));
            }
        };

        let debouncer = Debouncer::spawn(radio, &config.debounce);
        info!(
            grace_ms = config.debounce.grace_period_ms,
            stabilization_ms = config.debounce.stabilization_ms,
            "Daemon running"
        );

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, stopping daemon");
                    break Ok(());
                }
                name = signals.recv() => {
                    warn!(signal = name, "Signal received, initiating graceful shutdown");
                    break Ok(());
                }
                event = subscription.next() => match event {
                    Some(event) => debouncer.deliver(event).await,
                    None => {
                        error!(source = subscription.source(), "Power event stream closed");
                        break Err(DaemonError::Subscription(SubscriptionError::Closed));
                    }
                },
            }
        };

        let status = debouncer.shutdown().await;
        info!(
            sleeps = status.sleeps,
            wakes = status.wakes,
            disables = status.disables,
            enables = status.enables,
            "Pending timers cancelled"
        );
        let uptime_secs = lock
            .started_at()
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let released = lock.release();
        subscription.unsubscribe().await;
        info!(uptime_secs, "Daemon stopped");

        outcome?;
        released?;
        Ok(status)
    }
}

/// Release the record on an early-exit path, logging instead of masking the
/// original error.
fn release_record(lock: InstanceLock) {
    if let Err(e) = lock.release() {
        warn!(error = %e, "Failed to remove instance record");
    }
}

/// SIGTERM and SIGINT, both routed to the same graceful shutdown.
struct ShutdownSignals {
    term: Signal,
    int: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("power notification subscription failed: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("instance record error: {0}")]
    RecordWrite(#[source] InstanceError),

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InstanceError> for DaemonError {
    fn from(e: InstanceError) -> Self {
        match e {
            InstanceError::AlreadyRunning { pid } => DaemonError::AlreadyRunning { pid },
            other => DaemonError::RecordWrite(other),
        }
    }
}

impl DaemonError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> u8 {
        match self {
            DaemonError::AlreadyRunning { .. } => EXIT_ALREADY_RUNNING,
            _ => EXIT_FAILURE,
        }
    }
}
