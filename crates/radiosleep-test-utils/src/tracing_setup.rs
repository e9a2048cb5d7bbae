//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test whose daemon logs you
//! want to see. The subscriber is installed at most once per process.

use tracing_subscriber::EnvFilter;

/// Install a subscriber on the test-harness writer. `RUST_LOG` overrides
/// the default `radiosleep_core=debug` filter.
///
/// Later calls are ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     radiosleep_test_utils::init_test_tracing();
///     tracing::info!("visible with --nocapture");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("radiosleep_core=debug,info")),
        )
        .with_test_writer()
        .try_init();
}
