use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::applier::Applier;
use crate::error::MoltResult;
use crate::types::DmlEvent;

/// An in-memory [`Applier`] that records every batch it receives.
///
/// Useful for tests and dry runs. An optional artificial delay per batch can
/// be configured to exercise scheduling behavior under a slow downstream.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplier {
    batches: Arc<Mutex<Vec<Vec<DmlEvent>>>>,
    apply_delay: Option<Duration>,
}

impl MemoryApplier {
    /// Creates a new empty memory applier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a memory applier that sleeps for `delay` on every batch.
    pub fn with_apply_delay(delay: Duration) -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            apply_delay: Some(delay),
        }
    }

    /// Returns a copy of all batches applied so far.
    pub fn batches(&self) -> Vec<Vec<DmlEvent>> {
        self.batches.lock().unwrap().clone()
    }

    /// Returns all applied events flattened in application order.
    pub fn applied_events(&self) -> Vec<DmlEvent> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// Returns the number of events applied so far.
    pub fn applied_event_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

impl Applier for MemoryApplier {
    async fn apply_dml_events(&self, batch: Vec<DmlEvent>) -> MoltResult<()> {
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }
}
