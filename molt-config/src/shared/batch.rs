use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// DML batching configuration for applier workers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Initial number of DML events flushed to the applier in one batch. The
    /// live value can be retuned at runtime on the coordinator.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
}

impl BatchConfig {
    /// Default maximum DML batch size.
    pub const DEFAULT_MAX_SIZE: usize = 10;

    /// Validates batch configuration settings.
    ///
    /// Ensures max_size is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}
