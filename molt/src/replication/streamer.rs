use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::coordinator::scheduler::TransactionScheduler;
use crate::error::{ErrorKind, MoltResult};
use crate::metrics::MOLT_STREAM_RECONNECTS_TOTAL;
use crate::molt_error;
use crate::replication::source::{EventSource, EventStream};
use crate::types::BinlogEvent;

/// Pulls binlog events from an [`EventSource`] and feeds the coordinator.
///
/// [`BinlogStreamer`] owns the reconnect policy: a failed pull is retried by
/// re-opening the source at the coordinator's current position, which is the
/// position of the low water mark transaction. Transactions past the mark may
/// already have been applied and will be replayed; that is safe because DML
/// application is idempotent. After `max_retries` consecutive failures the
/// stream is declared dead.
pub struct BinlogStreamer<S> {
    source: S,
    scheduler: Arc<TransactionScheduler>,
    events_tx: mpsc::Sender<BinlogEvent>,
    max_retries: u32,
}

impl<S> BinlogStreamer<S>
where
    S: EventSource + Send,
{
    pub(crate) fn new(
        source: S,
        scheduler: Arc<TransactionScheduler>,
        events_tx: mpsc::Sender<BinlogEvent>,
        max_retries: u32,
    ) -> Self {
        Self {
            source,
            scheduler,
            events_tx,
            max_retries,
        }
    }

    /// Runs the event source and feeds the coordinator until stopped.
    ///
    /// Cancellation is cooperative: `can_stop` is checked before every
    /// blocking pull. Returns an error of kind [`ErrorKind::StreamDead`] once
    /// the reconnect budget is exhausted.
    pub async fn start_streaming<F>(self, mut can_stop: F) -> MoltResult<()>
    where
        F: FnMut() -> bool + Send,
    {
        let start_position = self.scheduler.current_binlog_position();
        info!(position = %start_position, "starting binlog stream");

        let mut stream = self.source.start(start_position).await?;
        let mut retries: u32 = 0;

        loop {
            if can_stop() {
                return Ok(());
            }

            let event = match stream.next_event().await {
                Ok(event) => {
                    retries = 0;
                    event
                }
                Err(err) => {
                    let position = self.scheduler.current_binlog_position();
                    if retries >= self.max_retries {
                        return Err(molt_error!(
                            ErrorKind::StreamDead,
                            "Binlog stream reconnects exhausted",
                            format!(
                                "{retries} successive failures in streamer reconnect at position {position}"
                            )
                        )
                        .with_source(err));
                    }
                    retries += 1;
                    counter!(MOLT_STREAM_RECONNECTS_TOTAL).increment(1);
                    warn!(
                        error = %err,
                        attempt = retries,
                        resume_position = %position,
                        "binlog stream failed, reconnecting at low water mark"
                    );
                    stream = self.source.start(position).await?;
                    continue;
                }
            };

            // The framer side hanging up means the coordinator is done.
            if self.events_tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}
