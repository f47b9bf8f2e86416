use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, RetryConfig, ValidationError};

/// Configuration for a binlog applier run.
///
/// [`ApplierConfig`] names the migrated table and its changelog companion,
/// sizes the worker pool, and carries the batching and reconnect settings the
/// coordinator hands to its components.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApplierConfig {
    /// Schema the migrated table lives in.
    pub database: String,
    /// Name of the table being migrated.
    pub original_table: String,
    /// Name of the changelog table. Defaults to the conventional
    /// `_<original_table>_ghc` companion when unset.
    #[serde(default)]
    pub changelog_table: Option<String>,
    /// Number of applier workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// DML batching settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Streamer reconnect settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ApplierConfig {
    /// Default worker pool size.
    pub const DEFAULT_WORKERS: usize = 16;

    /// Returns the effective changelog table name.
    pub fn changelog_table_name(&self) -> String {
        self.changelog_table
            .clone()
            .unwrap_or_else(|| format!("_{}_ghc", self.original_table))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.database.is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "database".to_string(),
            });
        }
        if self.original_table.is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "original_table".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workers".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }
        self.batch.validate()?;

        Ok(())
    }
}

fn default_workers() -> usize {
    ApplierConfig::DEFAULT_WORKERS
}
