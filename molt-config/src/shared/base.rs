use thiserror::Error;

/// Validation failure for a configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field value is outside its allowed range or shape.
    #[error("invalid value for field '{field}': {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A required field is missing or empty.
    #[error("missing required field '{field}'")]
    MissingRequiredField { field: String },
}
