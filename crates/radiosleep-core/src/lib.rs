#![deny(unsafe_code)]

//! radiosleep core daemon runtime.
//!
//! Watches for system sleep and wake notifications and drives the radio
//! power capability through a debounce state machine, so that short sleeps
//! never cost a radio power cycle. Also owns the single-instance record the
//! CLI uses to discover, start, and stop the daemon.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are **not**
/// object-safe. Traits consumed via `Box<dyn Trait>` or `Arc<dyn Trait>` return
/// a concrete `Pin<Box<dyn Future>>` instead. This alias keeps those signatures
/// readable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Daemon context object, main event loop, and shutdown sequence.
pub mod daemon;
/// Sleep/wake debounce state machine.
pub mod debounce;
/// System power event subscription.
pub mod events;
/// Single-instance record and process liveness probes.
pub mod instance;
/// Diagnostic log setup.
pub mod logging;
/// Radio power capability and toggle strategies.
pub mod radio;
/// Lifecycle controller operations (start, stop, status).
pub mod supervisor;

pub use daemon::{Daemon, DaemonError, ShutdownHandle};
pub use debounce::{DebounceState, DebounceStatus, Debouncer};
pub use events::{PowerEvent, PowerEventSource, Subscription, SubscriptionError};
pub use instance::{InstanceLock, InstanceStatus};
pub use radio::{FallbackRadio, RadioError, RadioPower};
