use std::fmt;

use thiserror::Error;

use crate::types::dml::{DmlEvent, DmlKind, Row};

/// Common header carried by every binlog event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventHeader {
    /// Byte offset of the end of this event within its log file.
    pub log_pos: u64,
    /// Size of the event in bytes.
    pub event_size: u64,
}

/// Rotation event announcing the next log file in sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateEvent {
    /// Name of the log file the upstream switches to.
    pub next_log_name: String,
}

/// Global transaction identifier event opening a transaction frame.
///
/// [`GtidEvent`] carries the upstream recorded scheduling hints: the
/// transaction's own `sequence_number` and the `last_committed` sequence
/// number it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtidEvent {
    /// Monotonically increasing transaction sequence number.
    pub sequence_number: i64,
    /// Sequence number of the latest transaction that must have committed
    /// before this one may execute.
    pub last_committed: i64,
}

/// Statement event; the applier only cares about `BEGIN` markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
    /// Default schema of the connection that issued the statement.
    pub schema: String,
    /// The statement body.
    pub query: String,
}

/// The row operation a [`RowsEvent`] encodes.
///
/// The `Unknown` arm represents row event types outside the three DML
/// operations; encountering one while applying is a structural failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsEventKind {
    WriteRows,
    UpdateRows,
    DeleteRows,
    Unknown,
}

impl RowsEventKind {
    /// Maps the row event type onto a DML operation, if there is one.
    pub fn dml_kind(&self) -> Option<DmlKind> {
        match self {
            Self::WriteRows => Some(DmlKind::Insert),
            Self::UpdateRows => Some(DmlKind::Update),
            Self::DeleteRows => Some(DmlKind::Delete),
            Self::Unknown => None,
        }
    }
}

/// The rows event type did not map to insert, update or delete.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("rows event type does not map to a DML operation")]
pub struct UnknownDmlKind;

/// Row change event carrying one or more row images for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsEvent {
    /// Schema of the affected table.
    pub schema: String,
    /// Name of the affected table.
    pub table: String,
    /// Which row operation the images encode.
    pub kind: RowsEventKind,
    /// The row images. Updates carry before/after pairs in adjacent slots.
    pub rows: Vec<Row>,
}

impl RowsEvent {
    /// Decodes the row images into [`DmlEvent`]s.
    ///
    /// Inserts produce one event per row with only new values, deletes one
    /// event per row with only where values. Updates consume rows pairwise:
    /// the even index is the before image, the odd index the after image. A
    /// trailing unpaired row is skipped.
    pub fn dml_events(&self) -> Result<Vec<DmlEvent>, UnknownDmlKind> {
        let kind = self.kind.dml_kind().ok_or(UnknownDmlKind)?;

        let events = match kind {
            DmlKind::Insert => self
                .rows
                .iter()
                .map(|row| DmlEvent::insert(&self.schema, &self.table, row.clone()))
                .collect(),
            DmlKind::Delete => self
                .rows
                .iter()
                .map(|row| DmlEvent::delete(&self.schema, &self.table, row.clone()))
                .collect(),
            DmlKind::Update => self
                .rows
                .chunks_exact(2)
                .map(|pair| {
                    DmlEvent::update(&self.schema, &self.table, pair[0].clone(), pair[1].clone())
                })
                .collect(),
        };

        Ok(events)
    }
}

/// A parsed binlog event: the wire header plus the event specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BinlogEvent {
    /// Common event header.
    pub header: EventHeader,
    /// Event specific payload.
    pub payload: EventPayload,
}

impl BinlogEvent {
    /// Returns the lightweight [`EventType`] of this event.
    pub fn event_type(&self) -> EventType {
        (&self.payload).into()
    }
}

/// The payload variants a binlog event can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Log rotation to the next file.
    Rotate(RotateEvent),
    /// Transaction identifier with scheduling hints.
    Gtid(GtidEvent),
    /// Statement event.
    Query(QueryEvent),
    /// Row change images.
    Rows(RowsEvent),
    /// Transaction commit boundary.
    Xid,
}

/// Classification of binlog event types without the associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Rotate,
    Gtid,
    Query,
    Rows,
    Xid,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rotate => write!(f, "Rotate"),
            Self::Gtid => write!(f, "Gtid"),
            Self::Query => write!(f, "Query"),
            Self::Rows => write!(f, "Rows"),
            Self::Xid => write!(f, "Xid"),
        }
    }
}

impl From<&EventPayload> for EventType {
    fn from(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::Rotate(_) => EventType::Rotate,
            EventPayload::Gtid(_) => EventType::Gtid,
            EventPayload::Query(_) => EventType::Query,
            EventPayload::Rows(_) => EventType::Rows,
            EventPayload::Xid => EventType::Xid,
        }
    }
}
