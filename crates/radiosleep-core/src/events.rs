//! System power event subscription.
//!
//! A [`PowerEventSource`] turns whatever the platform offers into a stream of
//! [`PowerEvent`]s. Subscribing registers with the platform and returns a
//! [`Subscription`]; the daemon reads events from it and calls
//! [`Subscription::unsubscribe`] during shutdown. Sources do no filtering or
//! debouncing of their own.

/// logind `PrepareForSleep` monitor.
pub mod logind;

use std::io::{BufRead, Read};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use radiosleep_config::EventsConfig;

use crate::BoxFuture;

pub use logind::LogindMonitor;

/// Events buffered between a source worker and the daemon loop.
const SUBSCRIPTION_BUFFER: usize = 64;

/// A system power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Sleep,
    Wake,
}

impl std::fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerEvent::Sleep => write!(f, "sleep"),
            PowerEvent::Wake => write!(f, "wake"),
        }
    }
}

/// Errors from registering for power notifications.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} has no output stream")]
    NoOutput(String),

    #[error("source {0} is already subscribed")]
    AlreadySubscribed(String),

    #[error("power event source unavailable: {0}")]
    Unavailable(String),

    #[error("power event stream closed")]
    Closed,
}

/// A provider of sleep/wake notifications.
pub trait PowerEventSource: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Register for notifications.
    fn subscribe(&mut self) -> BoxFuture<'_, Result<Subscription, SubscriptionError>>;
}

/// An active registration. Events arrive in the order the platform reported
/// them.
#[derive(Debug)]
pub struct Subscription {
    source: String,
    events: mpsc::Receiver<PowerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver fed by `worker`. The worker is aborted on unsubscribe.
    pub fn new(
        source: impl Into<String>,
        events: mpsc::Receiver<PowerEvent>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            source: source.into(),
            events,
            worker,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Next event, or `None` once the source has gone away.
    pub async fn next(&mut self) -> Option<PowerEvent> {
        self.events.recv().await
    }

    /// Deregister and release the source's resources.
    pub async fn unsubscribe(mut self) {
        self.events.close();
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
        info!(source = %self.source, "Power notifications deregistered");
    }
}

/// Map a line of the `stdin` protocol (`sleep` / `wake`) to an event.
pub fn parse_command_line(line: &str) -> Option<PowerEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "sleep" => Some(PowerEvent::Sleep),
        "wake" => Some(PowerEvent::Wake),
        _ => None,
    }
}

/// Spawn a task that reads `reader` line by line, maps each line through
/// `parse`, and forwards recognised events. The task ends at EOF, on a read
/// error, or when the subscription is dropped. `guard` lives exactly as long
/// as the task.
pub(crate) fn spawn_line_worker<R, G>(
    source: String,
    reader: R,
    parse: fn(&str) -> Option<PowerEvent>,
    guard: G,
) -> (mpsc::Receiver<PowerEvent>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    G: Send + 'static,
{
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let worker = tokio::spawn(async move {
        let _guard = guard;
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(event) = parse(&line) else {
                        continue;
                    };
                    debug!(source = %source, event = %event, "Power event received");
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    warn!(source = %source, "Power event source reached end of stream");
                    break;
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Power event source read failed");
                    break;
                }
            }
        }
    });
    (rx, worker)
}

/// Forward each recognised line of `reader` to `tx` from a blocking thread.
/// Returns at EOF, on a read error, or once the receiver is gone.
fn forward_lines<R: BufRead>(
    source: &str,
    reader: R,
    parse: fn(&str) -> Option<PowerEvent>,
    tx: &mpsc::Sender<PowerEvent>,
) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(source = %source, error = %e, "Power event source read failed");
                return;
            }
        };
        let Some(event) = parse(&line) else {
            continue;
        };
        debug!(source = %source, event = %event, "Power event received");
        if tx.blocking_send(event).is_err() {
            return;
        }
    }
    warn!(source = %source, "Power event source reached end of stream");
}

/// Reads the `sleep` / `wake` line protocol from a blocking reader.
///
/// Used with stdin for scripted runs of the daemon without a system bus. The
/// reader is drained on a detached OS thread, since a blocked stdin read
/// cannot be cancelled and would otherwise hold up runtime shutdown.
pub struct LineSource<R> {
    name: String,
    reader: Option<R>,
}

impl<R> LineSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
        }
    }
}

impl LineSource<std::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new("stdin", std::io::stdin())
    }
}

impl<R> PowerEventSource for LineSource<R>
where
    R: Read + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&mut self) -> BoxFuture<'_, Result<Subscription, SubscriptionError>> {
        Box::pin(async move {
            let reader = self
                .reader
                .take()
                .ok_or_else(|| SubscriptionError::AlreadySubscribed(self.name.clone()))?;
            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            let name = self.name.clone();
            std::thread::Builder::new()
                .name(format!("{}-events", self.name))
                .spawn(move || {
                    forward_lines(&name, std::io::BufReader::new(reader), parse_command_line, &tx);
                })
                .map_err(|source| SubscriptionError::Spawn {
                    program: format!("{} reader thread", self.name),
                    source,
                })?;
            info!(source = %self.name, "Power notifications registered");
            Ok(Subscription::new(self.name.clone(), rx, None))
        })
    }
}

/// Build the source selected by `[events]`.
pub fn source_from_config(config: &EventsConfig) -> Box<dyn PowerEventSource> {
    match config.source.as_str() {
        "stdin" => Box::new(LineSource::stdin()),
        _ => Box::new(LogindMonitor::new(config.monitor_program.clone())),
    }
}
