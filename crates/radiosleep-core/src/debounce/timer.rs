//! One-shot debounce timers with a single atomic terminal transition.
//!
//! A timer starts `Pending` and ends in exactly one of `Cancelled` or
//! `Fired`. Both [`DebounceTimer::try_cancel`] and [`DebounceTimer::try_fire`]
//! are compare-and-swap from `Pending`, so whichever runs first wins and the
//! other observes `false`. The action guarded by a timer runs only after a
//! successful `try_fire`.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::time::Instant;

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Grace period elapsed: disable the radio if it is still on.
    DisableRadio,
    /// Stabilization delay elapsed: enable the radio if it is off.
    EnableCheck,
}

/// Observed lifecycle of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Pending,
    Cancelled,
    Fired,
}

/// A scheduled, cancellable delayed action.
#[derive(Debug)]
pub struct DebounceTimer {
    id: u64,
    action: TimerAction,
    deadline: Instant,
    state: AtomicU8,
}

impl DebounceTimer {
    pub fn arm(id: u64, action: TimerAction, deadline: Instant) -> Self {
        Self {
            id,
            action,
            deadline,
            state: AtomicU8::new(PENDING),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn action(&self) -> TimerAction {
        self.action
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Move `Pending → Cancelled`. Returns `false` if the timer already
    /// reached a terminal state.
    pub fn try_cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    /// Move `Pending → Fired`. Returns `false` if the timer was cancelled
    /// (or already fired).
    pub fn try_fire(&self) -> bool {
        self.transition(FIRED)
    }

    pub fn state(&self) -> TimerState {
        match self.state.load(Ordering::Acquire) {
            PENDING => TimerState::Pending,
            CANCELLED => TimerState::Cancelled,
            _ => TimerState::Fired,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
