use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for a migration run.
///
/// The workspace ships no binary of its own; this is the entry point for the
/// driver embedding the applier, called once at startup before any
/// coordinator is constructed:
///
/// ```no_run
/// molt_telemetry::tracing::init_tracing();
/// ```
///
/// The filter is taken from `RUST_LOG` when set, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; the subscriber is installed once and output
/// is routed through the test writer so it interleaves with test output.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
