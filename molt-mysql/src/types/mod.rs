mod dml;
mod event;
mod position;

pub use dml::{CellValue, DmlEvent, DmlKind, Row};
pub use event::{
    BinlogEvent, EventHeader, EventPayload, EventType, GtidEvent, QueryEvent, RotateEvent,
    RowsEvent, RowsEventKind, UnknownDmlKind,
};
pub use position::{BinlogKind, BinlogPosition, PositionError};
