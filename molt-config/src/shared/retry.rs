use serde::{Deserialize, Serialize};

/// Reconnect budget for the binlog streamer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Number of consecutive stream failures tolerated before the stream is
    /// declared dead.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl RetryConfig {
    /// Default reconnect budget.
    pub const DEFAULT_MAX_RETRIES: u32 = 60;
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    RetryConfig::DEFAULT_MAX_RETRIES
}
