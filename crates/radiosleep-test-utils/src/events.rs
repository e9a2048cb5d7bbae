//! A channel-backed power event source.
//!
//! [`scripted_source`] returns a source to hand to the daemon and an
//! [`EventInjector`] the test uses to play sleep/wake notifications into it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use radiosleep_core::BoxFuture;
use radiosleep_core::{PowerEvent, PowerEventSource, Subscription, SubscriptionError};

/// [`PowerEventSource`] fed from a test-held [`EventInjector`].
pub struct ScriptedEventSource {
    events: Option<mpsc::Receiver<PowerEvent>>,
    fail_with: Option<String>,
    subscribes: Arc<AtomicUsize>,
}

impl ScriptedEventSource {
    /// A source whose subscription always fails with `Unavailable(reason)`.
    pub fn failing(reason: &str) -> Self {
        Self {
            events: None,
            fail_with: Some(reason.to_string()),
            subscribes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of subscribe attempts, shared across moves into the daemon.
    pub fn subscribe_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.subscribes)
    }
}

impl PowerEventSource for ScriptedEventSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn subscribe(&mut self) -> BoxFuture<'_, Result<Subscription, SubscriptionError>> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let result = match (&self.fail_with, self.events.take()) {
            (Some(reason), _) => Err(SubscriptionError::Unavailable(reason.clone())),
            (None, Some(rx)) => Ok(Subscription::new("scripted", rx, None)),
            (None, None) => Err(SubscriptionError::AlreadySubscribed("scripted".to_string())),
        };
        Box::pin(async move { result })
    }
}

/// Sends events into a [`ScriptedEventSource`]. Dropping every injector
/// ends the event stream.
#[derive(Debug, Clone)]
pub struct EventInjector {
    tx: mpsc::Sender<PowerEvent>,
}

impl EventInjector {
    pub async fn send(&self, event: PowerEvent) {
        // The daemon may already have shut down; that is not a test failure.
        let _ = self.tx.send(event).await;
    }

    pub async fn sleep(&self) {
        self.send(PowerEvent::Sleep).await;
    }

    pub async fn wake(&self) {
        self.send(PowerEvent::Wake).await;
    }
}

/// A connected source/injector pair.
pub fn scripted_source() -> (ScriptedEventSource, EventInjector) {
    let (tx, rx) = mpsc::channel(64);
    let source = ScriptedEventSource {
        events: Some(rx),
        fail_with: None,
        subscribes: Arc::new(AtomicUsize::new(0)),
    };
    (source, EventInjector { tx })
}
