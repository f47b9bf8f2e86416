use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

// Matches coordinates that were detached into a filename, e.g. `//binlog.01234:567890`.
static DETACHED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//([^/:]+):(\d+)").expect("detached pattern is a valid regex"));

/// Errors produced by binlog position parsing and rotation arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    /// The textual form did not contain a `file:pos` separator.
    #[error("cannot parse binlog position from {0:?}, expected format file:pos")]
    Malformed(String),
    /// The position part was not a decimal number.
    #[error("invalid binlog position {0:?}, expected a decimal log position")]
    InvalidLogPos(String),
    /// The file number is already zero, there is no previous file.
    #[error("log file number would go below zero, cannot detect previous file")]
    FileNumberZero,
}

/// The flavour of log a position refers to.
///
/// Relay logs use the same file naming and rotation scheme as binary logs, so
/// the distinction only participates in equality checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinlogKind {
    /// A binary log on the primary.
    #[default]
    Binary,
    /// A relay log on a replica.
    Relay,
}

/// A location in the upstream binary log.
///
/// [`BinlogPosition`] is a log file name plus a byte offset. Filenames follow
/// the `<stem>.<N>` convention with a zero padded numeric suffix, which is what
/// makes rotation arithmetic possible without consulting the server.
///
/// Ordering is lexicographic on the file name, then numeric on the offset.
/// `event_size` never participates in comparisons and `kind` only participates
/// in [`PartialEq`].
#[derive(Debug, Clone, Default)]
pub struct BinlogPosition {
    /// Name of the log file, e.g. `binlog.000001`. Empty means unset.
    pub log_file: String,
    /// Byte offset within the log file.
    pub log_pos: u64,
    /// Size in bytes of the event that ends at `log_pos`.
    pub event_size: u64,
    /// Whether this points into a binary log or a relay log.
    pub kind: BinlogKind,
}

impl PartialEq for BinlogPosition {
    fn eq(&self, other: &Self) -> bool {
        self.log_file == other.log_file && self.log_pos == other.log_pos && self.kind == other.kind
    }
}

impl Eq for BinlogPosition {}

impl BinlogPosition {
    /// Creates a binary log position at the given file and offset.
    pub fn new(log_file: impl Into<String>, log_pos: u64) -> Self {
        Self {
            log_file: log_file.into(),
            log_pos,
            event_size: 0,
            kind: BinlogKind::Binary,
        }
    }

    /// Parses a `file:pos` string into a position.
    pub fn parse(text: &str) -> Result<Self, PositionError> {
        let Some((log_file, log_pos)) = text.split_once(':') else {
            return Err(PositionError::Malformed(text.to_string()));
        };
        let log_pos = log_pos
            .parse::<u64>()
            .map_err(|_| PositionError::InvalidLogPos(log_pos.to_string()))?;

        Ok(Self::new(log_file, log_pos))
    }

    /// Returns true if the log file is empty, unnamed.
    pub fn is_empty(&self) -> bool {
        self.log_file.is_empty()
    }

    /// Returns true if this position is strictly smaller than the other.
    pub fn smaller_than(&self, other: &Self) -> bool {
        if self.log_file < other.log_file {
            return true;
        }
        self.log_file == other.log_file && self.log_pos < other.log_pos
    }

    /// Returns true if this position is smaller than or equal to the other.
    ///
    /// The log kind is deliberately not compared here, only file and offset.
    pub fn smaller_than_or_equals(&self, other: &Self) -> bool {
        if self.smaller_than(other) {
            return true;
        }
        self.log_file == other.log_file && self.log_pos == other.log_pos
    }

    /// Returns true if this position's file is strictly smaller than the other's.
    pub fn file_smaller_than(&self, other: &Self) -> bool {
        self.log_file < other.log_file
    }

    /// Returns the numeric value of the file suffix and the number of
    /// characters used to represent it in the filename.
    ///
    /// Example: `mysqld.log.000789` yields `(789, 6)`. A non numeric suffix
    /// yields `(0, 0)`.
    pub fn file_number(&self) -> (u64, usize) {
        let suffix = self.log_file.rsplit('.').next().unwrap_or_default();
        match suffix.parse::<u64>() {
            Ok(number) => (number, suffix.len()),
            Err(_) => (0, 0),
        }
    }

    /// Returns how many rotations separate this position's file from the
    /// other's. Positive means the other file is ahead.
    pub fn file_number_distance(&self, other: &Self) -> i64 {
        let (own, _) = self.file_number();
        let (theirs, _) = other.file_number();
        theirs as i64 - own as i64
    }

    /// Guesses the position of the log file `offset` rotations back, at
    /// offset zero, preserving the zero padding of the numeric suffix.
    pub fn previous_file_position_by(&self, offset: u64) -> Result<Self, PositionError> {
        let (number, width) = self.file_number();
        if number == 0 {
            return Err(PositionError::FileNumberZero);
        }
        let previous = number
            .checked_sub(offset)
            .ok_or(PositionError::FileNumberZero)?;

        Ok(self.with_file_number(previous, width))
    }

    /// Guesses the position of the previous log file.
    pub fn previous_file_position(&self) -> Result<Self, PositionError> {
        self.previous_file_position_by(1)
    }

    /// Guesses the position of the next log file, at offset zero, preserving
    /// the zero padding of the numeric suffix.
    pub fn next_file_position(&self) -> Self {
        let (number, width) = self.file_number();
        self.with_file_number(number + 1, width)
    }

    /// Extracts coordinates that were detached into the filename.
    ///
    /// A detached filename has the shape `//<name>:<digits>`; the captured
    /// file and position are returned as text. Returns `None` when the
    /// filename is a regular one.
    pub fn detached_coordinates(&self) -> Option<(String, String)> {
        let captures = DETACHED_PATTERN.captures(&self.log_file)?;
        Some((captures[1].to_string(), captures[2].to_string()))
    }

    fn with_file_number(&self, number: u64, width: usize) -> Self {
        let suffix = format!("{number:0width$}");
        let mut tokens: Vec<&str> = self.log_file.split('.').collect();
        if let Some(last) = tokens.last_mut() {
            *last = &suffix;
        }

        Self {
            log_file: tokens.join("."),
            log_pos: 0,
            event_size: 0,
            kind: self.kind,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.log_file, self.log_pos)
    }
}

impl FromStr for BinlogPosition {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_through_display() {
        let position = BinlogPosition::new("binlog.000123", 4567);
        let parsed = BinlogPosition::parse(&position.to_string()).unwrap();
        assert_eq!(parsed, position);
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let err = BinlogPosition::parse("binlog.000001").unwrap_err();
        assert!(matches!(err, PositionError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_non_decimal_position() {
        let err = BinlogPosition::parse("binlog.000001:abc").unwrap_err();
        assert!(matches!(err, PositionError::InvalidLogPos(_)));
    }

    #[test]
    fn file_number_reports_value_and_width() {
        let position = BinlogPosition::new("mysqld.log.000789", 0);
        assert_eq!(position.file_number(), (789, 6));
    }

    #[test]
    fn file_number_of_non_numeric_suffix_is_zero() {
        let position = BinlogPosition::new("relay.log", 0);
        assert_eq!(position.file_number(), (0, 0));
    }

    #[test]
    fn previous_then_next_restores_file_with_padding() {
        let position = BinlogPosition::new("binlog.000123", 98);
        let previous = position.previous_file_position().unwrap();
        assert_eq!(previous.log_file, "binlog.000122");
        assert_eq!(previous.log_pos, 0);

        let restored = previous.next_file_position();
        assert_eq!(restored.log_file, position.log_file);
    }

    #[test]
    fn previous_below_file_zero_fails() {
        let position = BinlogPosition::new("binlog.000000", 4);
        assert_eq!(
            position.previous_file_position().unwrap_err(),
            PositionError::FileNumberZero
        );

        let position = BinlogPosition::new("binlog.000002", 4);
        assert_eq!(
            position.previous_file_position_by(3).unwrap_err(),
            PositionError::FileNumberZero
        );
    }

    #[test]
    fn next_file_position_grows_past_pad_width() {
        let position = BinlogPosition::new("binlog.99", 12);
        assert_eq!(position.next_file_position().log_file, "binlog.100");
    }

    #[test]
    fn detached_coordinates_are_captured() {
        let detached = BinlogPosition::new("//foo:42", 0);
        assert_eq!(
            detached.detached_coordinates(),
            Some(("foo".to_string(), "42".to_string()))
        );

        let regular = BinlogPosition::new("binlog.000001", 0);
        assert_eq!(regular.detached_coordinates(), None);
    }

    #[test]
    fn ordering_is_by_file_then_position() {
        let early = BinlogPosition::new("binlog.000001", 500);
        let later_in_file = BinlogPosition::new("binlog.000001", 900);
        let next_file = BinlogPosition::new("binlog.000002", 4);

        assert!(early.smaller_than(&later_in_file));
        assert!(early.smaller_than(&next_file));
        assert!(early.file_smaller_than(&next_file));
        assert!(!early.file_smaller_than(&later_in_file));
        assert!(early.smaller_than_or_equals(&early.clone()));
        assert!(!later_in_file.smaller_than_or_equals(&early));
    }

    #[test]
    fn equality_includes_kind_but_not_event_size() {
        let binary = BinlogPosition::new("binlog.000001", 500);
        let mut sized = binary.clone();
        sized.event_size = 31;
        assert_eq!(binary, sized);

        let mut relay = binary.clone();
        relay.kind = BinlogKind::Relay;
        assert_ne!(binary, relay);
        // The relation that ignores kind still holds.
        assert!(binary.smaller_than_or_equals(&relay));
    }

    #[test]
    fn empty_position_is_detected() {
        assert!(BinlogPosition::default().is_empty());
        assert!(!BinlogPosition::new("binlog.000001", 0).is_empty());
    }

    #[test]
    fn file_number_distance_counts_rotations() {
        let own = BinlogPosition::new("binlog.000007", 0);
        let ahead = BinlogPosition::new("binlog.000012", 0);
        assert_eq!(own.file_number_distance(&ahead), 5);
        assert_eq!(ahead.file_number_distance(&own), -5);
    }
}
