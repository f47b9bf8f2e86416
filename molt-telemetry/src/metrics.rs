use std::sync::Mutex;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// The exporter installs a process-global recorder and fails on every call
// after the first. Both the migration driver and the coordinator integration
// tests reach [`init_metrics`], possibly from several threads at once, so the
// first handle is kept here and later callers receive clones. A `OnceLock`
// does not fit: installation is fallible and the error must reach the caller.
static INSTALLED_RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// A handle for rendering the applier's metrics.
///
/// The handle owns no HTTP surface. The migration driver already serves a
/// status endpoint while the applier runs, so it embeds
/// [`MetricsHandle::render`] there instead of opening a second listener.
#[derive(Clone)]
pub struct MetricsHandle {
    inner: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text exposition format.
    ///
    /// Recorder upkeep runs on every render, so a scrape interval is all it
    /// takes to keep histogram memory bounded; no background task is needed.
    pub fn render(&self) -> String {
        self.inner.run_upkeep();
        self.inner.render()
    }
}

/// Installs the Prometheus recorder and returns a render handle.
///
/// Safe to call repeatedly: the recorder is installed once per process and
/// every later call receives a handle to the same recorder.
pub fn init_metrics() -> Result<MetricsHandle, BuildError> {
    let mut installed = INSTALLED_RECORDER.lock().unwrap();

    if let Some(handle) = &*installed {
        return Ok(MetricsHandle {
            inner: handle.clone(),
        });
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *installed = Some(handle.clone());

    Ok(MetricsHandle { inner: handle })
}
