#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use molt::changelog::ChangelogHandler;
use molt::error::{ErrorKind, MoltResult};
use molt::molt_error;
use molt::replication::source::{EventSource, EventStream};
use molt::types::{
    ApplierConfig, BatchConfig, BinlogEvent, BinlogPosition, CellValue, DmlEvent, EventHeader,
    EventPayload, GtidEvent, QueryEvent, RetryConfig, RotateEvent, Row, RowsEvent, RowsEventKind,
};

pub const DATABASE: &str = "shop";
pub const ORIGINAL_TABLE: &str = "orders";
pub const CHANGELOG_TABLE: &str = "_orders_ghc";

pub fn test_config() -> ApplierConfig {
    ApplierConfig {
        database: DATABASE.to_string(),
        original_table: ORIGINAL_TABLE.to_string(),
        changelog_table: None,
        workers: ApplierConfig::DEFAULT_WORKERS,
        batch: BatchConfig::default(),
        retry: RetryConfig { max_retries: 4 },
    }
}

pub fn event(payload: EventPayload) -> BinlogEvent {
    BinlogEvent {
        header: EventHeader::default(),
        payload,
    }
}

pub fn gtid_event(sequence_number: i64, last_committed: i64) -> BinlogEvent {
    event(EventPayload::Gtid(GtidEvent {
        sequence_number,
        last_committed,
    }))
}

pub fn begin_event() -> BinlogEvent {
    event(EventPayload::Query(QueryEvent {
        schema: DATABASE.to_string(),
        query: "BEGIN".to_string(),
    }))
}

pub fn insert_event(table: &str, rows: Vec<Row>) -> BinlogEvent {
    event(EventPayload::Rows(RowsEvent {
        schema: DATABASE.to_string(),
        table: table.to_string(),
        kind: RowsEventKind::WriteRows,
        rows,
    }))
}

pub fn xid_event(log_pos: u64) -> BinlogEvent {
    BinlogEvent {
        header: EventHeader {
            log_pos,
            event_size: 31,
        },
        payload: EventPayload::Xid,
    }
}

pub fn rotate_event(next_log_name: &str) -> BinlogEvent {
    event(EventPayload::Rotate(RotateEvent {
        next_log_name: next_log_name.to_string(),
    }))
}

pub fn int_row(values: &[i64]) -> Row {
    values.iter().copied().map(CellValue::Integer).collect()
}

/// A complete transaction frame writing one row tagged with the sequence
/// number to the migrated table. The commit lands at `sequence_number * 1000`.
pub fn transaction(sequence_number: i64, last_committed: i64) -> Vec<BinlogEvent> {
    vec![
        gtid_event(sequence_number, last_committed),
        begin_event(),
        insert_event(ORIGINAL_TABLE, vec![int_row(&[sequence_number])]),
        xid_event(sequence_number as u64 * 1000),
    ]
}

/// Like [`transaction`], with an additional changelog table write.
pub fn transaction_with_changelog(sequence_number: i64, last_committed: i64) -> Vec<BinlogEvent> {
    vec![
        gtid_event(sequence_number, last_committed),
        begin_event(),
        insert_event(ORIGINAL_TABLE, vec![int_row(&[sequence_number])]),
        insert_event(CHANGELOG_TABLE, vec![int_row(&[sequence_number])]),
        xid_event(sequence_number as u64 * 1000),
    ]
}

/// Extracts the sequence tag a [`transaction`] frame wrote into its row.
pub fn sequence_tag(event: &DmlEvent) -> i64 {
    match event.new_values.as_ref().and_then(|row| row.first()) {
        Some(CellValue::Integer(value)) => *value,
        other => panic!("expected an integer sequence tag, got {other:?}"),
    }
}

/// One scripted item of a source connection: an event to yield or an injected
/// transport failure.
pub enum ScriptItem {
    Event(BinlogEvent),
    Failure,
}

/// An [`EventSource`] that replays scripted connections.
///
/// Every call to [`EventSource::start`] records the requested resume position
/// and serves the next scripted connection. An exhausted connection blocks
/// forever, like an idle upstream; connections past the script fail
/// immediately.
#[derive(Clone)]
pub struct ScriptedEventSource {
    connections: Arc<Mutex<VecDeque<Vec<ScriptItem>>>>,
    resume_positions: Arc<Mutex<Vec<BinlogPosition>>>,
}

impl ScriptedEventSource {
    pub fn new(connections: Vec<Vec<ScriptItem>>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(connections.into())),
            resume_positions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A source with a single connection that yields the given events and
    /// then idles forever.
    pub fn single(events: Vec<BinlogEvent>) -> Self {
        Self::new(vec![events.into_iter().map(ScriptItem::Event).collect()])
    }

    pub fn resume_positions(&self) -> Vec<BinlogPosition> {
        self.resume_positions.lock().unwrap().clone()
    }
}

impl EventSource for ScriptedEventSource {
    type Stream = ScriptedEventStream;

    async fn start(&self, from: BinlogPosition) -> MoltResult<Self::Stream> {
        self.resume_positions.lock().unwrap().push(from);
        let items = self.connections.lock().unwrap().pop_front();
        Ok(ScriptedEventStream {
            items: items.map(Into::into),
        })
    }
}

pub struct ScriptedEventStream {
    items: Option<VecDeque<ScriptItem>>,
}

impl EventStream for ScriptedEventStream {
    async fn next_event(&mut self) -> MoltResult<BinlogEvent> {
        let Some(items) = self.items.as_mut() else {
            return Err(molt_error!(
                ErrorKind::SourceConnectionFailed,
                "Scripted source has no more connections"
            ));
        };
        match items.pop_front() {
            Some(ScriptItem::Event(event)) => Ok(event),
            Some(ScriptItem::Failure) => Err(molt_error!(
                ErrorKind::SourceConnectionFailed,
                "Scripted transport failure"
            )),
            // An exhausted connection behaves like a quiet upstream.
            None => std::future::pending().await,
        }
    }
}

/// A [`ChangelogHandler`] that records every event it is handed.
#[derive(Clone, Default)]
pub struct RecordingChangelog {
    events: Arc<Mutex<Vec<DmlEvent>>>,
}

impl RecordingChangelog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DmlEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl ChangelogHandler for RecordingChangelog {
    fn handle_changelog(&self, event: &DmlEvent) -> MoltResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
