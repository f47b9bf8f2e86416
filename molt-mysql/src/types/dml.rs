use std::fmt;

/// A single column value as decoded from a binlog row image.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL NULL.
    Null,
    /// Signed integer column.
    Integer(i64),
    /// Unsigned integer column.
    Unsigned(u64),
    /// Floating point column.
    Float(f64),
    /// Character data.
    Text(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
}

/// An ordered row image, one cell per column.
pub type Row = Vec<CellValue>;

/// The kind of data modification a [`DmlEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for DmlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A decoded data modification ready to be replayed downstream.
///
/// Inserts carry only new values, deletes only where values, and updates carry
/// both, coalesced from the adjacent before/after row images of the upstream
/// rows event.
#[derive(Debug, Clone, PartialEq)]
pub struct DmlEvent {
    /// Schema the modified table lives in.
    pub schema: String,
    /// Name of the modified table.
    pub table: String,
    /// Which modification this event describes.
    pub kind: DmlKind,
    /// Row image identifying the affected row, for updates and deletes.
    pub where_values: Option<Row>,
    /// Row image with the values to write, for inserts and updates.
    pub new_values: Option<Row>,
}

impl DmlEvent {
    /// Creates an insert event carrying the new row image.
    pub fn insert(schema: impl Into<String>, table: impl Into<String>, new_values: Row) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kind: DmlKind::Insert,
            where_values: None,
            new_values: Some(new_values),
        }
    }

    /// Creates an update event carrying both the before and after row images.
    pub fn update(
        schema: impl Into<String>,
        table: impl Into<String>,
        where_values: Row,
        new_values: Row,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kind: DmlKind::Update,
            where_values: Some(where_values),
            new_values: Some(new_values),
        }
    }

    /// Creates a delete event carrying the row image to remove.
    pub fn delete(schema: impl Into<String>, table: impl Into<String>, where_values: Row) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kind: DmlKind::Delete,
            where_values: Some(where_values),
            new_values: None,
        }
    }
}
