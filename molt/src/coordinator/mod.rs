pub mod framer;
pub mod scheduler;
pub mod worker;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info};

use crate::applier::Applier;
use crate::bail;
use crate::changelog::ChangelogHandler;
use crate::coordinator::framer::TransactionFramer;
use crate::coordinator::scheduler::TransactionScheduler;
use crate::coordinator::worker::{Worker, WorkerHandle, WorkerStats, WorkerStatsSnapshot};
use crate::error::{ErrorKind, MoltError, MoltResult};
use crate::metrics::register_metrics;
use crate::molt_error;
use crate::replication::source::EventSource;
use crate::replication::streamer::BinlogStreamer;
use crate::types::{ApplierConfig, BinlogEvent, BinlogPosition, DmlEvent};

/// Capacity of the channel between the streamer and the framer.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Orchestrator of the parallel binlog applier.
///
/// [`Coordinator`] wires the streamer, the framer and the worker pool
/// together and owns the worker tasks. Typical usage:
///
/// 1. [`Coordinator::new`] with the configuration, the downstream applier and
///    the changelog callback.
/// 2. [`Coordinator::set_position`] with the migration's starting position.
/// 3. [`Coordinator::initialize_workers`] to spawn the pool.
/// 4. Spawn [`Coordinator::start_streaming`] with the event source.
/// 5. Drive [`Coordinator::process_events_until_drained`] in a loop.
/// 6. [`Coordinator::teardown`] and [`Coordinator::wait`] to finish.
///
/// Position and stats queries are safe to issue from other tasks at any time
/// through [`Coordinator::scheduler`].
pub struct Coordinator<A> {
    config: Arc<ApplierConfig>,
    applier: A,
    scheduler: Arc<TransactionScheduler>,
    events_tx: mpsc::Sender<BinlogEvent>,
    events_rx: Option<mpsc::Receiver<BinlogEvent>>,
    framer: Option<TransactionFramer>,
    worker_tasks: JoinSet<MoltResult<()>>,
}

impl<A> Coordinator<A>
where
    A: Applier + Clone + Send + Sync + 'static,
{
    /// Creates a coordinator. Workers are not spawned yet, see
    /// [`Coordinator::initialize_workers`].
    pub fn new(
        config: ApplierConfig,
        applier: A,
        changelog: impl ChangelogHandler + 'static,
    ) -> Self {
        register_metrics();

        let config = Arc::new(config);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let scheduler = Arc::new(TransactionScheduler::new(&config, Arc::new(changelog)));

        Self {
            config,
            applier,
            scheduler,
            events_tx,
            events_rx: Some(events_rx),
            framer: None,
            worker_tasks: JoinSet::new(),
        }
    }

    /// Spawns `count` workers, fills the free list and builds the framer.
    ///
    /// Must be called exactly once before events are processed.
    pub fn initialize_workers(&mut self, count: usize) -> MoltResult<()> {
        if count == 0 {
            bail!(
                ErrorKind::ConfigurationInvalid,
                "Worker count must be greater than zero"
            );
        }
        let Some(events_rx) = self.events_rx.take() else {
            bail!(
                ErrorKind::ConfigurationInvalid,
                "Workers are already initialized"
            );
        };

        let (free_tx, free_list_rx) = mpsc::channel(count);
        for id in 0..count {
            let (queue_tx, queue_rx) = mpsc::unbounded_channel();
            let handle = WorkerHandle::new(id, queue_tx);
            let stats = Arc::new(WorkerStats::default());
            self.scheduler.register_worker(stats.clone());

            free_tx.try_send(handle.clone()).map_err(|_| {
                molt_error!(
                    ErrorKind::ConfigurationInvalid,
                    "Worker free list rejected a fresh worker",
                    format!("worker {id}")
                )
            })?;

            let worker = Worker::new(
                id,
                &self.config,
                self.scheduler.clone(),
                self.applier.clone(),
                queue_rx,
                free_tx.clone(),
                handle,
                stats,
                self.scheduler.shutdown_rx(),
            );
            let span = tracing::info_span!("applier_worker", worker_id = id);
            self.worker_tasks.spawn(worker.run().instrument(span));
        }

        self.framer = Some(TransactionFramer::new(
            self.config.clone(),
            self.scheduler.clone(),
            events_rx,
            free_list_rx,
            self.scheduler.shutdown_rx(),
        ));

        info!(worker_count = count, "initialized applier workers");
        Ok(())
    }

    /// Builds the streaming future for the given event source.
    ///
    /// The returned future does not borrow the coordinator, so it can be
    /// spawned onto its own task while this coordinator keeps framing. The
    /// stream starts at the coordinator's current position and resumes there
    /// after reconnects; `can_stop` is checked before every pull.
    pub fn start_streaming<S, F>(
        &self,
        source: S,
        can_stop: F,
    ) -> impl Future<Output = MoltResult<()>> + Send + use<A, S, F>
    where
        S: EventSource + Send,
        F: FnMut() -> bool + Send,
    {
        BinlogStreamer::new(
            source,
            self.scheduler.clone(),
            self.events_tx.clone(),
            self.config.retry.max_retries,
        )
        .start_streaming(can_stop)
    }

    /// Dispatches buffered transactions until the backlog is drained.
    ///
    /// See [`TransactionFramer::process_events_until_drained`].
    pub async fn process_events_until_drained(&mut self) -> MoltResult<()> {
        self.framer_mut()?.process_events_until_drained().await
    }

    /// Scans the stream for the next changelog table write.
    ///
    /// See [`TransactionFramer::process_events_until_next_changelog_event`].
    pub async fn process_events_until_next_changelog_event(
        &mut self,
    ) -> MoltResult<Option<DmlEvent>> {
        self.framer_mut()?
            .process_events_until_next_changelog_event()
            .await
    }

    /// Returns a snapshot of the position attributable to the low water mark.
    pub fn current_binlog_position(&self) -> BinlogPosition {
        self.scheduler.current_binlog_position()
    }

    /// Replaces the current position, typically once before streaming starts.
    pub fn set_position(&self, position: BinlogPosition) {
        self.scheduler.set_position(position);
    }

    /// Retunes the DML batch size at runtime.
    pub fn set_dml_batch_size(&self, size: usize) {
        self.scheduler.set_dml_batch_size(size);
    }

    /// Aggregates the per-worker counters.
    pub fn get_worker_stats(&self) -> Vec<WorkerStatsSnapshot> {
        self.scheduler.worker_stats()
    }

    /// Shared scheduling state, for position and stats queries from other
    /// tasks.
    pub fn scheduler(&self) -> Arc<TransactionScheduler> {
        self.scheduler.clone()
    }

    /// Requests teardown. Workers observe the flag at the top of their loops
    /// and blocked ones are woken; use [`Coordinator::wait`] to join them.
    pub fn teardown(&self) {
        self.scheduler.teardown();
    }

    /// Waits for all workers to exit and aggregates their errors.
    pub async fn wait(&mut self) -> MoltResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.worker_tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "worker exited with error");
                    errors.push(err);
                }
                Err(join_err) if join_err.is_cancelled() => {
                    debug!("worker task was cancelled");
                }
                Err(join_err) => {
                    errors.push(
                        molt_error!(ErrorKind::WorkerPanicked, "Worker task panicked")
                            .with_source(join_err),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MoltError::from_many(errors))
        }
    }

    /// Requests teardown and waits for all workers to exit.
    pub async fn teardown_and_wait(&mut self) -> MoltResult<()> {
        self.teardown();
        self.wait().await
    }

    fn framer_mut(&mut self) -> MoltResult<&mut TransactionFramer> {
        self.framer.as_mut().ok_or_else(|| {
            molt_error!(
                ErrorKind::ConfigurationInvalid,
                "Workers are not initialized"
            )
        })
    }
}
