pub mod memory;

use std::future::Future;

use crate::error::MoltResult;
use crate::types::DmlEvent;

/// Trait for the downstream SQL execution layer.
///
/// [`Applier`] implementations replay decoded DML batches against the ghost
/// table. The coordinator calls [`Applier::apply_dml_events`] concurrently
/// from distinct workers, so implementations must be safe for concurrent use;
/// an implementation that serialises internally should do so behind its own
/// lock rather than relying on the coordinator.
///
/// Applied operations must be idempotent: after a stream reconnect the
/// coordinator replays from the low water mark and transactions past it may
/// be applied a second time.
pub trait Applier {
    /// Applies a batch of DML events downstream.
    fn apply_dml_events(&self, batch: Vec<DmlEvent>)
    -> impl Future<Output = MoltResult<()>> + Send;
}
