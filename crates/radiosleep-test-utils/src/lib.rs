#![deny(unsafe_code)]

//! Shared test utilities for the radiosleep workspace.
//!
//! Provides config builders, a controllable radio, a scripted power-event
//! source, a daemon fixture, and tracing helpers so that individual crate
//! tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! radiosleep-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod events;
pub mod radio;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use events::{EventInjector, ScriptedEventSource, scripted_source};
pub use radio::{MockRadio, RadioCall};
pub use tracing_setup::init_test_tracing;
