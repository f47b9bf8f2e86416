use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use crate::concurrency::shutdown::ShutdownRx;
use crate::coordinator::scheduler::TransactionScheduler;
use crate::coordinator::worker::{WorkerHandle, WorkerMessage};
use crate::error::{ErrorKind, MoltResult};
use crate::molt_error;
use crate::types::{ApplierConfig, BinlogEvent, DmlEvent, EventPayload};

/// Cuts the flat event stream into transaction frames and dispatches them.
///
/// [`TransactionFramer`] is the single consumer of the coordinator's event
/// channel. On a GTID event it takes a worker from the bounded free list,
/// blocking when all workers are busy, which is the applier's only
/// backpressure mechanism. It then forwards the frame event by event until
/// the commit boundary. Every row event is consumed here regardless of table
/// so frame boundaries stay intact; filtering happens in the worker.
///
/// A frame whose GTID is not followed by a `BEGIN` statement is abandoned
/// with an abort sentinel and the worker returns to the pool.
pub struct TransactionFramer {
    config: Arc<ApplierConfig>,
    changelog_table: String,
    scheduler: Arc<TransactionScheduler>,
    events_rx: mpsc::Receiver<BinlogEvent>,
    free_list_rx: mpsc::Receiver<WorkerHandle>,
    shutdown_rx: ShutdownRx,
}

impl TransactionFramer {
    pub(crate) fn new(
        config: Arc<ApplierConfig>,
        scheduler: Arc<TransactionScheduler>,
        events_rx: mpsc::Receiver<BinlogEvent>,
        free_list_rx: mpsc::Receiver<WorkerHandle>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        let changelog_table = config.changelog_table_name();
        Self {
            config,
            changelog_table,
            scheduler,
            events_rx,
            free_list_rx,
            shutdown_rx,
        }
    }

    /// Reads events and dispatches transactions until the backlog is drained.
    ///
    /// Returns once the event channel is momentarily empty and no worker owns
    /// a transaction, or when teardown is requested. The caller is expected
    /// to invoke this in its own loop for continuous operation.
    pub async fn process_events_until_drained(&mut self) -> MoltResult<()> {
        loop {
            if self.scheduler.is_finished() {
                return Ok(());
            }

            match self.events_rx.try_recv() {
                Ok(event) => self.dispatch(event).await?,
                Err(TryRecvError::Empty) => {
                    if self.scheduler.busy_workers() == 0 {
                        return Ok(());
                    }
                    tokio::task::yield_now().await;
                }
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Scans the stream for the next write to the changelog table.
    ///
    /// Used by the migration driver while it is not draining transactions,
    /// for example around cut-over. Returns `None` when the stream ends or
    /// teardown is requested first.
    pub async fn process_events_until_next_changelog_event(
        &mut self,
    ) -> MoltResult<Option<DmlEvent>> {
        loop {
            let Some(event) = self.next_framed_event().await else {
                return Ok(None);
            };
            let EventPayload::Rows(rows) = event.payload else {
                continue;
            };
            if !rows.schema.eq_ignore_ascii_case(&self.config.database) {
                continue;
            }
            if !rows.table.eq_ignore_ascii_case(&self.changelog_table) {
                continue;
            }

            let decoded = rows.dml_events().map_err(|err| {
                molt_error!(
                    ErrorKind::UnknownDml,
                    "Unknown DML event type",
                    format!("table {}.{}", rows.schema, rows.table)
                )
                .with_source(err)
            })?;
            if let Some(event) = decoded.into_iter().next() {
                return Ok(Some(event));
            }
        }
    }

    /// Handles one top-level event between transaction frames.
    pub(crate) async fn dispatch(&mut self, event: BinlogEvent) -> MoltResult<()> {
        match &event.payload {
            EventPayload::Gtid(gtid) => {
                self.scheduler.maybe_init_low_water_mark(gtid.sequence_number);
                self.dispatch_transaction(event).await
            }
            EventPayload::Rotate(rotate) => {
                self.scheduler.rotate_to(&rotate.next_log_name);
                Ok(())
            }
            // Everything else between frames is of no interest.
            _ => Ok(()),
        }
    }

    /// Acquires a worker and forwards one transaction frame to it.
    async fn dispatch_transaction(&mut self, gtid_event: BinlogEvent) -> MoltResult<()> {
        // The busy count is raised before the worker leaves the free list so
        // a concurrent drained check can never observe an idle pool while a
        // dispatch is mid-flight.
        self.scheduler.increment_busy_workers();
        let Some(worker) = self.acquire_worker().await else {
            self.scheduler.decrement_busy_workers();
            return Ok(());
        };

        worker.send(WorkerMessage::Event(gtid_event))?;

        let Some(next) = self.next_framed_event().await else {
            worker.send(WorkerMessage::Abort)?;
            return Ok(());
        };
        let begins = matches!(
            &next.payload,
            EventPayload::Query(query) if query.query == "BEGIN"
        );
        if !begins {
            debug!(
                worker_id = worker.id(),
                "transaction frame without BEGIN, aborting"
            );
            worker.send(WorkerMessage::Abort)?;
            return Ok(());
        }
        worker.send(WorkerMessage::Event(next))?;

        loop {
            let Some(event) = self.next_framed_event().await else {
                worker.send(WorkerMessage::Abort)?;
                return Ok(());
            };
            match &event.payload {
                EventPayload::Rows(_) => worker.send(WorkerMessage::Event(event))?,
                EventPayload::Xid => {
                    worker.send(WorkerMessage::Event(event))?;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    async fn next_framed_event(&mut self) -> Option<BinlogEvent> {
        tokio::select! {
            event = self.events_rx.recv() => event,
            _ = self.shutdown_rx.changed() => None,
        }
    }

    async fn acquire_worker(&mut self) -> Option<WorkerHandle> {
        tokio::select! {
            worker = self.free_list_rx.recv() => worker,
            _ = self.shutdown_rx.changed() => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::ChangelogHandler;
    use crate::types::{
        CellValue, EventHeader, GtidEvent, QueryEvent, RotateEvent, RowsEvent, RowsEventKind,
    };

    fn test_config() -> ApplierConfig {
        ApplierConfig {
            database: "shop".to_string(),
            original_table: "orders".to_string(),
            changelog_table: None,
            workers: 1,
            batch: Default::default(),
            retry: Default::default(),
        }
    }

    fn event(payload: EventPayload) -> BinlogEvent {
        BinlogEvent {
            header: EventHeader::default(),
            payload,
        }
    }

    struct Harness {
        framer: TransactionFramer,
        events_tx: mpsc::Sender<BinlogEvent>,
        scheduler: Arc<TransactionScheduler>,
        worker_queue_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    }

    fn harness() -> Harness {
        let config = Arc::new(test_config());
        let changelog: Arc<dyn ChangelogHandler> =
            Arc::new(|_: &DmlEvent| -> MoltResult<()> { Ok(()) });
        let scheduler = Arc::new(TransactionScheduler::new(&config, changelog));

        let (events_tx, events_rx) = mpsc::channel(64);
        let (free_tx, free_list_rx) = mpsc::channel(1);
        let (worker_queue_tx, worker_queue_rx) = mpsc::unbounded_channel();
        free_tx
            .try_send(WorkerHandle::new(0, worker_queue_tx))
            .expect("free list has room for the worker");

        let framer = TransactionFramer::new(
            config,
            scheduler.clone(),
            events_rx,
            free_list_rx,
            scheduler.shutdown_rx(),
        );

        Harness {
            framer,
            events_tx,
            scheduler,
            worker_queue_rx,
        }
    }

    fn gtid_event(sequence_number: i64, last_committed: i64) -> BinlogEvent {
        event(EventPayload::Gtid(GtidEvent {
            sequence_number,
            last_committed,
        }))
    }

    fn query_event(query: &str) -> BinlogEvent {
        event(EventPayload::Query(QueryEvent {
            schema: "shop".to_string(),
            query: query.to_string(),
        }))
    }

    #[tokio::test]
    async fn a_frame_without_begin_is_aborted() {
        let mut harness = harness();

        harness
            .events_tx
            .send(query_event("CREATE TABLE t (id INT)"))
            .await
            .unwrap();
        harness.framer.dispatch(gtid_event(1, 0)).await.unwrap();

        assert!(matches!(
            harness.worker_queue_rx.recv().await,
            Some(WorkerMessage::Event(BinlogEvent {
                payload: EventPayload::Gtid(_),
                ..
            }))
        ));
        assert!(matches!(
            harness.worker_queue_rx.recv().await,
            Some(WorkerMessage::Abort)
        ));
        // The worker still owns the aborted frame until it requeues itself.
        assert_eq!(harness.scheduler.busy_workers(), 1);
    }

    #[tokio::test]
    async fn a_complete_frame_is_forwarded_up_to_the_commit() {
        let mut harness = harness();

        harness.events_tx.send(query_event("BEGIN")).await.unwrap();
        harness
            .events_tx
            .send(event(EventPayload::Rows(RowsEvent {
                schema: "shop".to_string(),
                table: "orders".to_string(),
                kind: RowsEventKind::WriteRows,
                rows: vec![vec![CellValue::Integer(1)]],
            })))
            .await
            .unwrap();
        harness.events_tx.send(event(EventPayload::Xid)).await.unwrap();

        harness.framer.dispatch(gtid_event(1, 0)).await.unwrap();

        let mut forwarded = Vec::new();
        while let Ok(message) = harness.worker_queue_rx.try_recv() {
            forwarded.push(message);
        }
        assert_eq!(forwarded.len(), 4);
        assert!(matches!(
            &forwarded[0],
            WorkerMessage::Event(BinlogEvent {
                payload: EventPayload::Gtid(_),
                ..
            })
        ));
        assert!(matches!(
            &forwarded[1],
            WorkerMessage::Event(BinlogEvent {
                payload: EventPayload::Query(_),
                ..
            })
        ));
        assert!(matches!(
            &forwarded[2],
            WorkerMessage::Event(BinlogEvent {
                payload: EventPayload::Rows(_),
                ..
            })
        ));
        assert!(matches!(
            &forwarded[3],
            WorkerMessage::Event(BinlogEvent {
                payload: EventPayload::Xid,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn rotations_move_the_current_file() {
        let mut harness = harness();
        harness
            .scheduler
            .set_position(crate::types::BinlogPosition::new("binlog.000001", 4));

        harness
            .framer
            .dispatch(event(EventPayload::Rotate(RotateEvent {
                next_log_name: "binlog.000002".to_string(),
            })))
            .await
            .unwrap();

        let position = harness.scheduler.current_binlog_position();
        assert_eq!(position.log_file, "binlog.000002");
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_idle() {
        let mut harness = harness();
        harness.framer.process_events_until_drained().await.unwrap();
    }

    #[tokio::test]
    async fn changelog_scan_returns_the_first_matching_write() {
        let mut harness = harness();

        harness
            .events_tx
            .send(event(EventPayload::Rows(RowsEvent {
                schema: "shop".to_string(),
                table: "orders".to_string(),
                kind: RowsEventKind::WriteRows,
                rows: vec![vec![CellValue::Integer(1)]],
            })))
            .await
            .unwrap();
        harness
            .events_tx
            .send(event(EventPayload::Rows(RowsEvent {
                schema: "shop".to_string(),
                table: "_orders_ghc".to_string(),
                kind: RowsEventKind::WriteRows,
                rows: vec![vec![CellValue::Text("state".to_string())]],
            })))
            .await
            .unwrap();

        let found = harness
            .framer
            .process_events_until_next_changelog_event()
            .await
            .unwrap()
            .expect("changelog write expected");
        assert_eq!(found.table, "_orders_ghc");
        assert_eq!(
            found.new_values,
            Some(vec![CellValue::Text("state".to_string())])
        );
    }
}
