//! A controllable radio for tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use radiosleep_core::BoxFuture;
use radiosleep_core::{RadioError, RadioPower};

/// One call observed by [`MockRadio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    Query,
    Enable,
    Disable,
}

#[derive(Debug, Default)]
struct Inner {
    enabled: AtomicBool,
    fail_enable: AtomicBool,
    fail_disable: AtomicBool,
    query_delay_ms: AtomicU64,
    calls: Mutex<Vec<RadioCall>>,
}

/// In-memory [`RadioPower`] that records every call.
///
/// Clones share state, so a test can keep one clone while the daemon owns
/// another. A successful enable/disable flips the simulated power state.
#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    inner: Arc<Inner>,
}

impl MockRadio {
    /// A radio that starts powered on.
    pub fn enabled() -> Self {
        let radio = Self::default();
        radio.set_enabled(true);
        radio
    }

    /// A radio that starts powered off.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn fail_enable(&self, fail: bool) {
        self.inner.fail_enable.store(fail, Ordering::SeqCst);
    }

    pub fn fail_disable(&self, fail: bool) {
        self.inner.fail_disable.store(fail, Ordering::SeqCst);
    }

    /// Make every status query take `delay` (virtual time under a paused
    /// clock) before answering.
    pub fn set_query_delay(&self, delay: Duration) {
        self.inner
            .query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.inner
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, call: RadioCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn disable_calls(&self) -> usize {
        self.count(RadioCall::Disable)
    }

    pub fn enable_calls(&self) -> usize {
        self.count(RadioCall::Enable)
    }

    /// Shared handle suitable for `Debouncer::spawn` and `Daemon::new`.
    pub fn handle(&self) -> Arc<dyn RadioPower> {
        Arc::new(self.clone())
    }

    fn record(&self, call: RadioCall) {
        if let Ok(mut calls) = self.inner.calls.lock() {
            calls.push(call);
        }
    }

    fn toggle(&self, call: RadioCall, target: bool, fail: &AtomicBool) -> Result<(), RadioError> {
        self.record(call);
        if fail.load(Ordering::SeqCst) {
            return Err(RadioError::CommandFailed {
                program: "mock".to_string(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        self.set_enabled(target);
        Ok(())
    }
}

impl RadioPower for MockRadio {
    fn is_enabled(&self) -> BoxFuture<'_, bool> {
        self.record(RadioCall::Query);
        let on = self.is_on();
        let delay = Duration::from_millis(self.inner.query_delay_ms.load(Ordering::SeqCst));
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            on
        })
    }

    fn enable(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        let result = self.toggle(RadioCall::Enable, true, &self.inner.fail_enable);
        Box::pin(async move { result })
    }

    fn disable(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        let result = self.toggle(RadioCall::Disable, false, &self.inner.fail_disable);
        Box::pin(async move { result })
    }
}
