mod applier;
mod base;
mod batch;
mod retry;

pub use applier::ApplierConfig;
pub use base::ValidationError;
pub use batch::BatchConfig;
pub use retry::RetryConfig;
