//! Sleep/wake debounce state machine.
//!
//! The machine runs as a single task that owns both timer slots, so sleep,
//! wake, and timer expiry are handled strictly one at a time:
//!
//! ```text
//!            sleep                     grace elapsed
//!   Idle ───────────► ArmedForDisable ───────────────► Idle (disabled_after_delay)
//!    ▲                  │    ▲  │ sleep (reset)
//!    │       wake       │    └──┘
//!    └──────────────────┘
//! ```
//!
//! Every wake, whether or not it cancelled a timer, schedules an enable check
//! after the stabilization delay. Radio toggles are always preceded by a
//! fresh [`RadioPower::is_enabled`] query, and a failed toggle is logged and
//! left for the next sleep/wake cycle.

/// One-shot timers with an atomic cancel/fire transition.
pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use radiosleep_config::DebounceConfig;

use crate::events::PowerEvent;
use crate::radio::RadioPower;

pub use timer::{DebounceTimer, TimerAction, TimerState};

/// Pending events buffered between the subscription and the machine.
const EVENT_BUFFER: usize = 64;

/// Observable state of the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebounceState {
    /// No disable is pending.
    #[default]
    Idle,
    /// A sleep was observed and the disable timer is running.
    ArmedForDisable,
}

impl std::fmt::Display for DebounceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebounceState::Idle => write!(f, "idle"),
            DebounceState::ArmedForDisable => write!(f, "armed-for-disable"),
        }
    }
}

/// Diagnostic snapshot published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebounceStatus {
    pub state: DebounceState,
    /// Set when a fired timer disabled the radio; cleared by the next wake.
    pub disabled_after_delay: bool,
    pub sleeps: u64,
    pub wakes: u64,
    pub timers_armed: u64,
    pub timers_cancelled: u64,
    pub timers_fired: u64,
    pub disables: u64,
    pub enables: u64,
    pub toggle_failures: u64,
}

impl DebounceStatus {
    /// Disable timers armed but not yet cancelled or fired.
    pub fn timers_in_flight(&self) -> u64 {
        self.timers_armed - self.timers_cancelled - self.timers_fired
    }
}

/// Handle to a running debounce machine.
///
/// Dropping the handle without calling [`shutdown`](Debouncer::shutdown)
/// closes the event channel; the machine then cancels its timers and exits.
pub struct Debouncer {
    events: mpsc::Sender<PowerEvent>,
    stop: Option<oneshot::Sender<()>>,
    status: watch::Receiver<DebounceStatus>,
    task: JoinHandle<DebounceStatus>,
}

impl Debouncer {
    /// Spawn the machine on the current Tokio runtime.
    pub fn spawn(radio: Arc<dyn RadioPower>, config: &DebounceConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(DebounceStatus::default());

        let machine = Machine {
            radio,
            grace_period: config.grace_period(),
            stabilization: config.stabilization_delay(),
            disable_timer: None,
            enable_timer: None,
            next_timer_id: 0,
            status: DebounceStatus::default(),
            status_tx,
        };
        let task = tokio::spawn(machine.run(events_rx, stop_rx));

        Self {
            events: events_tx,
            stop: Some(stop_tx),
            status: status_rx,
            task,
        }
    }

    /// Deliver a sleep notification.
    pub async fn on_sleep(&self) {
        self.deliver(PowerEvent::Sleep).await;
    }

    /// Deliver a wake notification.
    pub async fn on_wake(&self) {
        self.deliver(PowerEvent::Wake).await;
    }

    pub async fn deliver(&self, event: PowerEvent) {
        if self.events.send(event).await.is_err() {
            warn!(event = %event, "Debounce machine has stopped, dropping event");
        }
    }

    /// Latest published snapshot.
    pub fn status(&self) -> DebounceStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<DebounceStatus> {
        self.status.clone()
    }

    /// Cancel pending timers without running their actions and stop the
    /// machine. Returns the final snapshot.
    pub async fn shutdown(mut self) -> DebounceStatus {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let fallback = self.status();
        match (&mut self.task).await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Debounce task ended abnormally");
                fallback
            }
        }
    }
}

/// Task-owned state; never shared.
struct Machine {
    radio: Arc<dyn RadioPower>,
    grace_period: Duration,
    stabilization: Duration,
    disable_timer: Option<DebounceTimer>,
    enable_timer: Option<DebounceTimer>,
    next_timer_id: u64,
    status: DebounceStatus,
    status_tx: watch::Sender<DebounceStatus>,
}

/// Sleep until `deadline`, or forever when there is none.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Machine {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<PowerEvent>,
        mut stop: oneshot::Receiver<()>,
    ) -> DebounceStatus {
        loop {
            let disable_at = self.disable_timer.as_ref().map(DebounceTimer::deadline);
            let enable_at = self.enable_timer.as_ref().map(DebounceTimer::deadline);

            // Stop first, then queued events, so a wake that is already
            // queued when the deadline passes still cancels the disable.
            tokio::select! {
                biased;
                _ = &mut stop => break,
                event = events.recv() => match event {
                    Some(PowerEvent::Sleep) => self.on_sleep(),
                    Some(PowerEvent::Wake) => self.on_wake(),
                    None => break,
                },
                _ = expire(disable_at) => self.on_disable_timer().await,
                _ = expire(enable_at) => self.on_enable_timer().await,
            }
        }

        self.cancel_all();
        self.status
    }

    fn arm(&mut self, action: TimerAction, delay: Duration) -> DebounceTimer {
        self.next_timer_id += 1;
        let timer = DebounceTimer::arm(self.next_timer_id, action, Instant::now() + delay);
        debug!(
            timer = timer.id(),
            action = ?timer.action(),
            delay_ms = delay.as_millis() as u64,
            "Timer armed"
        );
        timer
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    fn on_sleep(&mut self) {
        self.status.sleeps += 1;

        if let Some(previous) = self.disable_timer.take()
            && previous.try_cancel()
        {
            self.status.timers_cancelled += 1;
            info!(timer = previous.id(), "Sleep observed again, restarting grace period");
        }

        let timer = self.arm(TimerAction::DisableRadio, self.grace_period);
        info!(
            timer = timer.id(),
            grace_ms = self.grace_period.as_millis() as u64,
            "System will sleep, radio disable armed"
        );
        self.disable_timer = Some(timer);
        self.status.timers_armed += 1;
        self.status.state = DebounceState::ArmedForDisable;
        self.publish();
    }

    fn on_wake(&mut self) {
        self.status.wakes += 1;
        self.status.disabled_after_delay = false;

        match self.disable_timer.take() {
            Some(timer) if timer.try_cancel() => {
                self.status.timers_cancelled += 1;
                info!(timer = timer.id(), "System woke before grace period, disable cancelled");
            }
            Some(timer) => {
                debug!(timer = timer.id(), state = ?timer.state(), "Disable timer already consumed");
            }
            None => info!("System woke, no disable timer pending"),
        }
        self.status.state = DebounceState::Idle;

        if let Some(previous) = self.enable_timer.take() {
            previous.try_cancel();
        }
        let timer = self.arm(TimerAction::EnableCheck, self.stabilization);
        self.enable_timer = Some(timer);
        self.publish();
    }

    async fn on_disable_timer(&mut self) {
        let Some(timer) = self.disable_timer.take() else {
            return;
        };
        self.status.state = DebounceState::Idle;
        if !timer.try_fire() {
            debug!(timer = timer.id(), "Disable timer was cancelled before firing");
            self.publish();
            return;
        }
        self.status.timers_fired += 1;
        info!(timer = timer.id(), "Grace period elapsed, checking radio");

        if self.radio.is_enabled().await {
            match self.radio.disable().await {
                Ok(()) => {
                    self.status.disables += 1;
                    self.status.disabled_after_delay = true;
                    info!(
                        grace_ms = self.grace_period.as_millis() as u64,
                        "Radio disabled after grace period"
                    );
                }
                Err(e) => {
                    self.status.toggle_failures += 1;
                    error!(error = %e, "Radio disable failed, will retry on next sleep");
                }
            }
        } else {
            info!("Radio already disabled");
        }
        self.publish();
    }

    async fn on_enable_timer(&mut self) {
        let Some(timer) = self.enable_timer.take() else {
            return;
        };
        if !timer.try_fire() {
            return;
        }

        if self.radio.is_enabled().await {
            info!("Radio already enabled after wake");
        } else {
            match self.radio.enable().await {
                Ok(()) => {
                    self.status.enables += 1;
                    info!("Radio enabled after wake");
                }
                Err(e) => {
                    self.status.toggle_failures += 1;
                    error!(error = %e, "Radio enable failed, will retry on next wake");
                }
            }
        }
        self.publish();
    }

    fn cancel_all(&mut self) {
        if let Some(timer) = self.disable_timer.take()
            && timer.try_cancel()
        {
            self.status.timers_cancelled += 1;
            info!(timer = timer.id(), "Pending radio disable cancelled for shutdown");
        }
        if let Some(timer) = self.enable_timer.take()
            && timer.try_cancel()
        {
            debug!(timer = timer.id(), "Pending enable check cancelled for shutdown");
        }
        self.status.state = DebounceState::Idle;
        self.publish();
    }
}
