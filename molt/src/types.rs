//! Re-exports of the domain types the applier operates on.

pub use molt_config::shared::{ApplierConfig, BatchConfig, RetryConfig, ValidationError};
pub use molt_mysql::types::{
    BinlogEvent, BinlogKind, BinlogPosition, CellValue, DmlEvent, DmlKind, EventHeader,
    EventPayload, EventType, GtidEvent, PositionError, QueryEvent, RotateEvent, Row, RowsEvent,
    RowsEventKind, UnknownDmlKind,
};
