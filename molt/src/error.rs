use std::{error, fmt, result};

use molt_config::shared::ValidationError;
use molt_mysql::types::PositionError;

/// Type alias for convenience when using the Result type with our error.
pub type MoltResult<T> = result::Result<T, MoltError>;

/// Classification of applier failures.
///
/// The kind drives the propagation policy: transport failures are retried by
/// the streamer, apply failures are logged and tolerated, and structural
/// failures are fatal to the worker that saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The event source failed to deliver or connect; retried by the streamer.
    SourceConnectionFailed,
    /// The streamer exhausted its reconnect budget.
    StreamDead,
    /// A rows event type outside insert, update and delete was encountered.
    UnknownDml,
    /// The downstream applier rejected a DML batch.
    ApplyFailed,
    /// The user supplied changelog callback returned an error.
    ChangelogCallbackFailed,
    /// A worker's event queue is gone, the worker is dead.
    WorkerLost,
    /// A worker task panicked.
    WorkerPanicked,
    /// A worker task was cancelled.
    WorkerCancelled,
    /// A binlog position could not be parsed or shifted.
    InvalidPosition,
    /// The applier configuration is invalid or was used out of order.
    ConfigurationInvalid,
    /// An aggregation of several errors.
    Many,
}

impl ErrorKind {
    /// Returns true if the streamer may retry after an error of this kind.
    pub fn is_source_retryable(&self) -> bool {
        matches!(self, ErrorKind::SourceConnectionFailed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceConnectionFailed => "source_connection_failed",
            Self::StreamDead => "stream_dead",
            Self::UnknownDml => "unknown_dml",
            Self::ApplyFailed => "apply_failed",
            Self::ChangelogCallbackFailed => "changelog_callback_failed",
            Self::WorkerLost => "worker_lost",
            Self::WorkerPanicked => "worker_panicked",
            Self::WorkerCancelled => "worker_cancelled",
            Self::InvalidPosition => "invalid_position",
            Self::ConfigurationInvalid => "configuration_invalid",
            Self::Many => "many",
        };
        write!(f, "{name}")
    }
}

/// Internal error representation with kind, description and optional detail.
///
/// Boxed to keep the public error a single pointer wide on the success path.
struct ErrorRepr {
    kind: ErrorKind,
    description: &'static str,
    detail: Option<String>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

/// The error type of the molt applier.
///
/// Carries a stable [`ErrorKind`], a static description and an optional
/// dynamic detail string, plus an optional source error for chaining.
pub struct MoltError(Box<ErrorRepr>);

impl MoltError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// Returns the dynamic detail attached to this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.0.detail.as_deref()
    }

    /// Attaches a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        self.0.source = Some(source.into());
        self
    }

    /// Aggregates several errors into one of kind [`ErrorKind::Many`].
    pub fn from_many(errors: Vec<MoltError>) -> Self {
        let detail = errors
            .iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        MoltError(Box::new(ErrorRepr {
            kind: ErrorKind::Many,
            description: "Multiple errors occurred",
            detail: Some(detail),
            source: Some(Box::new(Errors(errors))),
        }))
    }
}

impl fmt::Debug for MoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoltError")
            .field("kind", &self.0.kind)
            .field("description", &self.0.description)
            .field("detail", &self.0.detail)
            .field("source", &self.0.source)
            .finish()
    }
}

impl fmt::Display for MoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.description)?;
        if let Some(detail) = &self.0.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl error::Error for MoltError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for MoltError {
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        MoltError(Box::new(ErrorRepr {
            kind,
            description,
            detail: None,
            source: None,
        }))
    }
}

impl From<(ErrorKind, &'static str, String)> for MoltError {
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        MoltError(Box::new(ErrorRepr {
            kind,
            description,
            detail: Some(detail),
            source: None,
        }))
    }
}

impl From<PositionError> for MoltError {
    fn from(err: PositionError) -> Self {
        MoltError::from((
            ErrorKind::InvalidPosition,
            "Invalid binlog position",
            err.to_string(),
        ))
        .with_source(err)
    }
}

impl From<ValidationError> for MoltError {
    fn from(err: ValidationError) -> Self {
        MoltError::from((
            ErrorKind::ConfigurationInvalid,
            "Invalid applier configuration",
            err.to_string(),
        ))
        .with_source(err)
    }
}

/// A collection of errors, used as the source of an aggregated error.
pub struct Errors(Vec<MoltError>);

impl Errors {
    /// Returns the collected errors.
    pub fn iter(&self) -> impl Iterator<Item = &MoltError> {
        self.0.iter()
    }
}

impl fmt::Debug for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Errors")
            .field("count", &self.0.len())
            .field("errors", &self.0)
            .finish()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.0[0]),
            count => {
                write!(f, "{count} errors: ")?;
                for (i, error) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Errors {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        // Only the first error can be surfaced through the source chain.
        self.0.first().and_then(|err| err.source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molt_error;

    #[test]
    fn display_includes_detail_when_present() {
        let plain = molt_error!(ErrorKind::StreamDead, "Stream reconnects exhausted");
        assert_eq!(plain.to_string(), "Stream reconnects exhausted");

        let detailed = molt_error!(
            ErrorKind::StreamDead,
            "Stream reconnects exhausted",
            "3 successive failures"
        );
        assert_eq!(
            detailed.to_string(),
            "Stream reconnects exhausted: 3 successive failures"
        );
        assert_eq!(detailed.kind(), ErrorKind::StreamDead);
    }

    #[test]
    fn only_source_failures_are_retryable() {
        assert!(ErrorKind::SourceConnectionFailed.is_source_retryable());
        assert!(!ErrorKind::StreamDead.is_source_retryable());
        assert!(!ErrorKind::UnknownDml.is_source_retryable());
    }

    #[test]
    fn many_aggregates_error_messages() {
        let err = MoltError::from_many(vec![
            molt_error!(ErrorKind::ApplyFailed, "Apply failed"),
            molt_error!(ErrorKind::WorkerPanicked, "Worker panicked"),
        ]);
        assert_eq!(err.kind(), ErrorKind::Many);
        assert!(err.to_string().contains("Apply failed"));
        assert!(err.to_string().contains("Worker panicked"));
    }

    #[test]
    fn position_errors_convert_with_kind() {
        let err: MoltError = PositionError::FileNumberZero.into();
        assert_eq!(err.kind(), ErrorKind::InvalidPosition);
    }
}
