//! The bridge between the applier and the surrounding migration driver.
//!
//! Writes to the distinguished changelog table signal migration progress.
//! The coordinator surfaces them through a [`ChangelogHandler`] only after
//! every transaction with a smaller sequence number has committed, so the
//! handler always observes a consistent ghost table.

use crate::error::MoltResult;
use crate::types::DmlEvent;

/// Callback invoked for writes to the changelog table.
///
/// Handlers are called serialised under the coordinator's state lock and must
/// therefore return quickly and must not call back into the coordinator. A
/// returned error is surfaced to the worker that saw the changelog write and
/// logged; it does not halt the pipeline.
pub trait ChangelogHandler: Send + Sync {
    /// Handles one changelog table write.
    fn handle_changelog(&self, event: &DmlEvent) -> MoltResult<()>;
}

impl<F> ChangelogHandler for F
where
    F: Fn(&DmlEvent) -> MoltResult<()> + Send + Sync,
{
    fn handle_changelog(&self, event: &DmlEvent) -> MoltResult<()> {
        self(event)
    }
}
