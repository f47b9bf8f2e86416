use std::future::Future;

use crate::error::MoltResult;
use crate::types::{BinlogEvent, BinlogPosition};

/// Trait for the upstream replication wire client.
///
/// An [`EventSource`] opens a stream of parsed binlog events starting at a
/// given position. The coordinator re-opens the source on transport failures,
/// resuming at its low water mark position, so a source must tolerate being
/// started repeatedly and from positions it already served.
pub trait EventSource {
    /// The stream type produced by [`EventSource::start`].
    type Stream: EventStream + Send;

    /// Starts streaming events from the given position.
    fn start(
        &self,
        from: BinlogPosition,
    ) -> impl Future<Output = MoltResult<Self::Stream>> + Send;
}

/// A live stream of parsed binlog events.
///
/// The stream is single consumer. Pulls block until an event is available or
/// the transport fails; a failed pull poisons the stream and the caller is
/// expected to open a fresh one through the source.
pub trait EventStream {
    /// Pulls the next event, blocking until one is available.
    fn next_event(&mut self) -> impl Future<Output = MoltResult<BinlogEvent>> + Send;
}
