use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::gauge;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::changelog::ChangelogHandler;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::coordinator::worker::{WorkerStats, WorkerStatsSnapshot};
use crate::error::MoltResult;
use crate::metrics::{MOLT_BUSY_WORKERS, MOLT_LOW_WATER_MARK};
use crate::types::{ApplierConfig, BinlogPosition, DmlEvent};

/// One-shot gate a worker awaits until its dependency has committed.
///
/// Resolved exactly once, when the low water mark reaches the sequence number
/// the gate was registered under.
pub type TransactionGate = oneshot::Receiver<()>;

/// End-of-transaction mark kept for completed transactions ahead of the low
/// water mark. The file name component of the position is owned by rotation
/// events, so only offset and event size are recorded here.
#[derive(Debug, Clone, Copy)]
struct CompletedMark {
    log_pos: u64,
    event_size: u64,
}

#[derive(Default)]
struct SchedulerState {
    /// Sequence number of the last transaction known committed together with
    /// all of its predecessors. Monotonically non-decreasing.
    low_water_mark: i64,
    low_water_mark_initialized: bool,
    /// Completed transactions with sequence numbers past the low water mark,
    /// keyed by sequence number.
    completed: HashMap<i64, CompletedMark>,
    /// Suspended transactions indexed by the sequence number they wait for.
    waiters: HashMap<i64, Vec<oneshot::Sender<()>>>,
    /// Stats handles of every worker, in worker id order.
    workers: Vec<Arc<WorkerStats>>,
}

/// Shared scheduling state of the coordinator.
///
/// [`TransactionScheduler`] decides when a transaction may begin executing,
/// collapses out-of-order completions into the monotonic low water mark, and
/// tracks the binlog position attributable to that mark.
///
/// Two locks are involved and never held together: the state lock covers the
/// low water mark, the completed and waiter maps and worker membership, the
/// position lock covers only the current position. When both are needed the
/// state lock is released first and the position update works from the value
/// captured under it. Gates are resolved after both locks are released.
pub struct TransactionScheduler {
    changelog: Arc<dyn ChangelogHandler>,
    dml_batch_size: AtomicU64,
    state: Mutex<SchedulerState>,
    current_position: Mutex<BinlogPosition>,
    busy_workers: AtomicI64,
    finished: AtomicBool,
    shutdown_tx: ShutdownTx,
}

impl TransactionScheduler {
    /// Creates a scheduler with the batch size seeded from the configuration.
    pub fn new(config: &ApplierConfig, changelog: Arc<dyn ChangelogHandler>) -> Self {
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();

        Self {
            changelog,
            dml_batch_size: AtomicU64::new(config.batch.max_size.max(1) as u64),
            state: Mutex::new(SchedulerState::default()),
            current_position: Mutex::new(BinlogPosition::default()),
            busy_workers: AtomicI64::new(0),
            finished: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Returns the DML batch size currently in effect.
    pub fn dml_batch_size(&self) -> usize {
        self.dml_batch_size.load(Ordering::Relaxed) as usize
    }

    /// Retunes the DML batch size. Takes effect at the next transaction each
    /// worker picks up.
    pub fn set_dml_batch_size(&self, size: usize) {
        self.dml_batch_size.store(size.max(1) as u64, Ordering::Relaxed);
    }

    /// Returns true once teardown has been requested.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Requests teardown: workers observe the flag at the top of their loops
    /// and blocked ones are woken through the shutdown channel.
    pub fn teardown(&self) {
        self.finished.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Returns a fresh receiver for the shutdown signal.
    pub fn shutdown_rx(&self) -> ShutdownRx {
        self.shutdown_tx.subscribe()
    }

    /// Number of workers currently owning a transaction.
    pub fn busy_workers(&self) -> i64 {
        self.busy_workers.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_busy_workers(&self) {
        self.busy_workers.fetch_add(1, Ordering::SeqCst);
        gauge!(MOLT_BUSY_WORKERS).increment(1.0);
    }

    pub(crate) fn decrement_busy_workers(&self) {
        self.busy_workers.fetch_sub(1, Ordering::SeqCst);
        gauge!(MOLT_BUSY_WORKERS).decrement(1.0);
    }

    /// Returns the low water mark: every transaction with a sequence number
    /// at or below it is known committed.
    pub fn low_water_mark(&self) -> i64 {
        self.state.lock().unwrap().low_water_mark
    }

    /// Seeds the low water mark from the first transaction seen on the
    /// stream, so that transaction can run immediately.
    pub fn maybe_init_low_water_mark(&self, sequence_number: i64) {
        let mut state = self.state.lock().unwrap();
        if !state.low_water_mark_initialized && sequence_number > 0 {
            state.low_water_mark = sequence_number - 1;
            state.low_water_mark_initialized = true;
            debug!(
                low_water_mark = state.low_water_mark,
                "initialized low water mark from first transaction"
            );
        }
    }

    /// Registers interest in the completion of `sequence_number`.
    ///
    /// Returns `None` when the transaction is already known committed, either
    /// through the low water mark or the completed map. Otherwise returns a
    /// one-shot gate resolved when the mark reaches the sequence number.
    pub fn wait_for_transaction(&self, sequence_number: i64) -> Option<TransactionGate> {
        let mut state = self.state.lock().unwrap();

        if sequence_number <= state.low_water_mark {
            return None;
        }
        if state.completed.contains_key(&sequence_number) {
            return None;
        }

        let (gate_tx, gate_rx) = oneshot::channel();
        state
            .waiters
            .entry(sequence_number)
            .or_default()
            .push(gate_tx);

        Some(gate_rx)
    }

    /// Records the completion of a transaction and advances the low water
    /// mark over the longest prefix of consecutive completed sequence
    /// numbers.
    ///
    /// The current position is moved to the end mark of the last advanced
    /// transaction, after the state lock is released. All gates registered on
    /// sequence numbers now at or below the mark are resolved last, outside
    /// both locks.
    pub fn mark_transaction_completed(&self, sequence_number: i64, log_pos: u64, event_size: u64) {
        let mut last_advance: Option<CompletedMark> = None;
        let mut gates_to_resolve: Vec<oneshot::Sender<()>> = Vec::new();
        let low_water_mark;

        {
            let mut state = self.state.lock().unwrap();

            // A completion at or below the mark is a replay after reconnect;
            // it is already accounted for.
            if sequence_number <= state.low_water_mark {
                return;
            }

            state.completed.insert(
                sequence_number,
                CompletedMark {
                    log_pos,
                    event_size,
                },
            );

            loop {
                let next = state.low_water_mark + 1;
                let Some(mark) = state.completed.remove(&next) else {
                    break;
                };
                state.low_water_mark = next;
                last_advance = Some(mark);
            }
            low_water_mark = state.low_water_mark;

            let ready: Vec<i64> = state
                .waiters
                .keys()
                .copied()
                .filter(|waiting_for| *waiting_for <= low_water_mark)
                .collect();
            for key in ready {
                if let Some(gates) = state.waiters.remove(&key) {
                    gates_to_resolve.extend(gates);
                }
            }
        }

        if let Some(mark) = last_advance {
            let mut position = self.current_position.lock().unwrap();
            position.log_pos = mark.log_pos;
            position.event_size = mark.event_size;
            gauge!(MOLT_LOW_WATER_MARK).set(low_water_mark as f64);
        }

        for gate in gates_to_resolve {
            // A worker that went away while suspended is fine to ignore.
            let _ = gate.send(());
        }
    }

    /// Invokes the changelog callback, serialised under the state lock so it
    /// observes a stable view of the scheduler.
    pub fn handle_changelog_event(&self, event: &DmlEvent) -> MoltResult<()> {
        let _state = self.state.lock().unwrap();
        self.changelog.handle_changelog(event)
    }

    /// Returns a snapshot of the position attributable to the low water mark.
    pub fn current_binlog_position(&self) -> BinlogPosition {
        self.current_position.lock().unwrap().clone()
    }

    /// Replaces the current position, typically once before streaming starts.
    pub fn set_position(&self, position: BinlogPosition) {
        *self.current_position.lock().unwrap() = position;
    }

    /// Applies a log rotation: the current position moves to the named file.
    pub fn rotate_to(&self, next_log_name: &str) {
        let mut position = self.current_position.lock().unwrap();
        info!(
            from = %position,
            to = next_log_name,
            "rotating to next binlog file"
        );
        position.log_file = next_log_name.to_string();
    }

    pub(crate) fn register_worker(&self, stats: Arc<WorkerStats>) {
        self.state.lock().unwrap().workers.push(stats);
    }

    /// Aggregates the per-worker counters into snapshots, in worker id order.
    pub fn worker_stats(&self) -> Vec<WorkerStatsSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .workers
            .iter()
            .enumerate()
            .map(|(worker_id, stats)| stats.snapshot(worker_id))
            .collect()
    }
}
