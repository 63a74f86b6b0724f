mod classifier;
mod http;

pub use classifier::{MAX_RETRIES, PendingVerdict, RETRY_DELAY, RetryPolicy, RiskClassifierClient};
pub use http::{HttpBackend, action_path};
