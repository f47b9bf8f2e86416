use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::applier::Applier;
use crate::concurrency::shutdown::ShutdownRx;
use crate::coordinator::scheduler::{TransactionGate, TransactionScheduler};
use crate::error::{ErrorKind, MoltResult};
use crate::metrics::{
    MOLT_BATCH_APPLY_DURATION_MILLISECONDS, MOLT_DML_BATCH_SIZE, MOLT_DML_EVENTS_APPLIED_TOTAL,
    MOLT_TRANSACTION_WAIT_DURATION_MILLISECONDS, MOLT_TRANSACTIONS_APPLIED_TOTAL, WORKER_ID_LABEL,
};
use crate::molt_error;
use crate::types::{ApplierConfig, BinlogEvent, DmlEvent, EventPayload, RowsEvent};

/// A message on a worker's event queue.
///
/// `Abort` is the sentinel the framer sends when a transaction frame turns
/// out to be malformed: the worker drops the frame, marks the transaction
/// completed at its start position and returns to the free list.
pub(crate) enum WorkerMessage {
    Event(BinlogEvent),
    Abort,
}

/// Cloneable handle through which the framer feeds a worker and through
/// which a worker re-queues itself on the free list.
#[derive(Debug, Clone)]
pub(crate) struct WorkerHandle {
    id: usize,
    queue: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub(crate) fn new(id: usize, queue: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { id, queue }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Forwards a message to the worker. Fails when the worker is gone, which
    /// the coordinator treats as terminal.
    pub(crate) fn send(&self, message: WorkerMessage) -> MoltResult<()> {
        self.queue.send(message).map_err(|_| {
            molt_error!(
                ErrorKind::WorkerLost,
                "Worker event queue is gone",
                format!("worker {}", self.id)
            )
        })
    }
}

/// Per-worker counters, updated by the worker and read by stats queries.
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    executed_jobs: AtomicU64,
    dml_events_applied: AtomicU64,
    busy_time_ns: AtomicU64,
    wait_time_ns: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn snapshot(&self, worker_id: usize) -> WorkerStatsSnapshot {
        let executed_jobs = self.executed_jobs.load(Ordering::Relaxed);
        let dml_events_applied = self.dml_events_applied.load(Ordering::Relaxed);
        let busy_time = Duration::from_nanos(self.busy_time_ns.load(Ordering::Relaxed));
        let wait_time = Duration::from_nanos(self.wait_time_ns.load(Ordering::Relaxed));

        let busy_ms = busy_time.as_millis() as u64;
        let (dml_rate, trx_rate) = if busy_ms > 0 {
            (
                1000.0 * dml_events_applied as f64 / busy_ms as f64,
                1000.0 * executed_jobs as f64 / busy_ms as f64,
            )
        } else {
            (0.0, 0.0)
        };

        WorkerStatsSnapshot {
            worker_id,
            executed_jobs,
            dml_events_applied,
            busy_time,
            wait_time,
            dml_rate,
            trx_rate,
        }
    }
}

/// A point-in-time view of one worker's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatsSnapshot {
    /// Identifier of the worker these counters belong to.
    pub worker_id: usize,
    /// Transactions fully applied by this worker.
    pub executed_jobs: u64,
    /// DML events successfully applied downstream.
    pub dml_events_applied: u64,
    /// Time spent inside downstream apply calls.
    pub busy_time: Duration,
    /// Time spent suspended on transaction dependencies.
    pub wait_time: Duration,
    /// Applied DML events per second of busy time. Zero when never busy.
    pub dml_rate: f64,
    /// Applied transactions per second of busy time. Zero when never busy.
    pub trx_rate: f64,
}

/// One applier worker.
///
/// A worker owns an unbounded event queue fed by the framer and applies one
/// transaction at a time: it records the scheduling hints from the leading
/// GTID event, suspends until its `last_committed` dependency is at or below
/// the low water mark, batches the frame's DML to the downstream applier and
/// reports completion back to the scheduler.
pub(crate) struct Worker<A> {
    id: usize,
    scheduler: Arc<TransactionScheduler>,
    applier: A,
    queue: mpsc::UnboundedReceiver<WorkerMessage>,
    free_list: mpsc::Sender<WorkerHandle>,
    handle: WorkerHandle,
    stats: Arc<WorkerStats>,
    shutdown_rx: ShutdownRx,
    database: String,
    original_table: String,
    changelog_table: String,
}

impl<A> Worker<A>
where
    A: Applier + Send + Sync,
{
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        config: &ApplierConfig,
        scheduler: Arc<TransactionScheduler>,
        applier: A,
        queue: mpsc::UnboundedReceiver<WorkerMessage>,
        free_list: mpsc::Sender<WorkerHandle>,
        handle: WorkerHandle,
        stats: Arc<WorkerStats>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            id,
            scheduler,
            applier,
            queue,
            free_list,
            handle,
            stats,
            shutdown_rx,
            database: config.database.clone(),
            original_table: config.original_table.clone(),
            changelog_table: config.changelog_table_name(),
        }
    }

    /// The apply loop. Runs until teardown, a closed queue, or a structural
    /// failure such as an unknown DML type.
    pub(crate) async fn run(mut self) -> MoltResult<()> {
        loop {
            if self.scheduler.is_finished() {
                return Ok(());
            }

            let message = tokio::select! {
                message = self.queue.recv() => message,
                _ = self.shutdown_rx.changed() => return Ok(()),
            };
            let Some(message) = message else {
                return Ok(());
            };
            let event = match message {
                WorkerMessage::Event(event) => event,
                WorkerMessage::Abort => continue,
            };

            let gtid_header = event.header;
            let EventPayload::Gtid(gtid) = event.payload else {
                debug!(
                    worker_id = self.id,
                    "expected a gtid event at the start of a transaction frame"
                );
                continue;
            };

            if let Some(gate) = self.scheduler.wait_for_transaction(gtid.last_committed) {
                if !self.wait_on_gate(gate).await {
                    return Ok(());
                }
            }

            // Re-read per transaction so runtime retuning takes effect.
            let batch_capacity = self.scheduler.dml_batch_size();
            let mut batch: Vec<DmlEvent> = Vec::with_capacity(batch_capacity);
            let mut changelog_event: Option<DmlEvent> = None;
            let mut end_header = gtid_header;

            loop {
                let message = tokio::select! {
                    message = self.queue.recv() => message,
                    _ = self.shutdown_rx.changed() => return Ok(()),
                };
                let Some(message) = message else {
                    return Ok(());
                };
                let event = match message {
                    WorkerMessage::Event(event) => event,
                    WorkerMessage::Abort => {
                        debug!(
                            worker_id = self.id,
                            sequence_number = gtid.sequence_number,
                            "transaction frame aborted before commit"
                        );
                        break;
                    }
                };

                let header = event.header;
                match event.payload {
                    EventPayload::Rows(rows) => {
                        self.process_rows_event(
                            rows,
                            &mut batch,
                            &mut changelog_event,
                            batch_capacity,
                        )
                        .await?;
                    }
                    EventPayload::Xid => {
                        if !batch.is_empty() {
                            self.apply_dml_events(&mut batch).await;
                        }
                        self.stats.executed_jobs.fetch_add(1, Ordering::Relaxed);
                        counter!(
                            MOLT_TRANSACTIONS_APPLIED_TOTAL,
                            WORKER_ID_LABEL => self.id.to_string()
                        )
                        .increment(1);
                        end_header = header;
                        break;
                    }
                    // BEGIN and any other event inside the frame.
                    _ => {}
                }
            }

            self.scheduler.mark_transaction_completed(
                gtid.sequence_number,
                end_header.log_pos,
                end_header.event_size,
            );

            if let Some(changelog) = changelog_event {
                // The callback must observe every earlier transaction, so
                // gate once more on the immediate predecessor.
                if let Some(gate) = self
                    .scheduler
                    .wait_for_transaction(gtid.sequence_number - 1)
                {
                    if !self.wait_on_gate(gate).await {
                        return Ok(());
                    }
                }
                if let Err(err) = self.scheduler.handle_changelog_event(&changelog) {
                    error!(worker_id = self.id, error = %err, "changelog callback failed");
                }
            }

            if self.free_list.send(self.handle.clone()).await.is_err() {
                return Ok(());
            }
            self.scheduler.decrement_busy_workers();
        }
    }

    /// Filters a rows event down to the migrated and changelog tables and
    /// folds the decoded DML into the running batch.
    async fn process_rows_event(
        &self,
        rows: RowsEvent,
        batch: &mut Vec<DmlEvent>,
        changelog_event: &mut Option<DmlEvent>,
        batch_capacity: usize,
    ) -> MoltResult<()> {
        if !rows.schema.eq_ignore_ascii_case(&self.database) {
            return Ok(());
        }
        let is_original = rows.table.eq_ignore_ascii_case(&self.original_table);
        let is_changelog = rows.table.eq_ignore_ascii_case(&self.changelog_table);
        if !is_original && !is_changelog {
            return Ok(());
        }

        let decoded = rows.dml_events().map_err(|err| {
            molt_error!(
                ErrorKind::UnknownDml,
                "Unknown DML event type",
                format!("table {}.{}", rows.schema, rows.table)
            )
            .with_source(err)
        })?;

        for dml in decoded {
            if is_changelog {
                // Changelog writes are surfaced only after the end of the
                // transaction they belong to.
                *changelog_event = Some(dml);
            } else {
                batch.push(dml);
                if batch.len() >= batch_capacity {
                    self.apply_dml_events(batch).await;
                }
            }
        }

        Ok(())
    }

    /// Flushes the batch downstream. A failed apply is logged and tolerated;
    /// the surrounding migration detects inconsistency through the changelog.
    async fn apply_dml_events(&self, batch: &mut Vec<DmlEvent>) {
        let events = std::mem::take(batch);
        let applied = events.len();
        histogram!(MOLT_DML_BATCH_SIZE).record(applied as f64);

        let busy_start = Instant::now();
        match self.applier.apply_dml_events(events).await {
            Ok(()) => {
                let elapsed = busy_start.elapsed();
                self.stats
                    .busy_time_ns
                    .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
                self.stats
                    .dml_events_applied
                    .fetch_add(applied as u64, Ordering::Relaxed);
                counter!(
                    MOLT_DML_EVENTS_APPLIED_TOTAL,
                    WORKER_ID_LABEL => self.id.to_string()
                )
                .increment(applied as u64);
                histogram!(MOLT_BATCH_APPLY_DURATION_MILLISECONDS)
                    .record(elapsed.as_secs_f64() * 1000.0);
            }
            Err(err) => {
                // TODO: retry failed batches with bounded backoff before
                // giving up on them.
                error!(worker_id = self.id, error = %err, "failed to apply dml batch");
            }
        }
    }

    /// Blocks on a transaction gate, accumulating wait time. Returns false
    /// when woken by shutdown instead of by the gate.
    async fn wait_on_gate(&mut self, gate: TransactionGate) -> bool {
        let wait_start = Instant::now();
        let mut gate = gate;
        let proceed = tokio::select! {
            result = &mut gate => result.is_ok(),
            _ = self.shutdown_rx.changed() => false,
        };
        let waited = wait_start.elapsed();
        self.stats
            .wait_time_ns
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
        histogram!(MOLT_TRANSACTION_WAIT_DURATION_MILLISECONDS)
            .record(waited.as_secs_f64() * 1000.0);
        proceed
    }
}
