//! Risk classification with bounded, fixed-delay retry and a fallback verdict.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use safesurf_core::{ReputationBackend, RiskLevel, RiskVerdict};

/// Max retry attempts after the first failed request.
pub const MAX_RETRIES: u32 = 2;

/// Fixed pause between attempts. Not cumulative.
pub const RETRY_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Level reported when every attempt failed. `Trusted` is fail-open.
    pub fallback_risk: RiskLevel,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
            fallback_risk: RiskLevel::Trusted,
        }
    }
}

/// Classifies URLs against a [`ReputationBackend`]. Never fails.
pub struct RiskClassifierClient {
    backend: Arc<dyn ReputationBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RiskClassifierClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskClassifierClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RiskClassifierClient {
    pub fn new(backend: Arc<dyn ReputationBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Classify `url`, retrying transport failures and falling back to the
    /// policy's verdict once attempts run out.
    pub async fn classify(&self, url: &str) -> RiskVerdict {
        let span = info_span!("classify", url = %url);
        self.classify_until(url, &CancellationToken::new())
            .instrument(span)
            .await
            .unwrap_or_else(|| RiskVerdict::fallback(url, self.policy.fallback_risk))
    }

    /// Start a classification on its own task.
    ///
    /// Dropping the returned handle does not stop the work; cancelling its
    /// token does, at the next request or retry pause.
    pub fn classify_detached(self: &Arc<Self>, url: impl Into<String>) -> PendingVerdict {
        let url = url.into();
        let token = CancellationToken::new();
        let span = info_span!("classify", url = %url);

        let client = Arc::clone(self);
        let task_token = token.clone();
        let handle = tokio::spawn(
            async move {
                let verdict = client.classify_until(&url, &task_token).await;
                if verdict.is_none() {
                    debug!("classification cancelled");
                }
                verdict
            }
            .instrument(span),
        );

        PendingVerdict { token, handle }
    }

    /// `None` only when `token` was cancelled.
    async fn classify_until(&self, url: &str, token: &CancellationToken) -> Option<RiskVerdict> {
        let attempts = self.policy.max_retries + 1;

        for attempt in 1..=attempts {
            let result = tokio::select! {
                () = token.cancelled() => return None,
                result = self.backend.check_url(url) => result,
            };

            match result {
                Ok(response) => {
                    let verdict = response.into_verdict(url);
                    debug!(
                        attempt,
                        risk = %verdict.risk,
                        reason = %verdict.reason,
                        "classification received"
                    );
                    return Some(verdict);
                }
                Err(error) => {
                    warn!(
                        attempt,
                        max = attempts,
                        error = %format!("{error:#}"),
                        "classification attempt failed"
                    );
                    if attempt < attempts {
                        tokio::select! {
                            () = token.cancelled() => return None,
                            () = tokio::time::sleep(self.policy.retry_delay) => {}
                        }
                    }
                }
            }
        }

        warn!(
            fallback = %self.policy.fallback_risk,
            "backend unavailable, using fallback verdict"
        );
        Some(RiskVerdict::fallback(url, self.policy.fallback_risk))
    }
}

/// A classification running on its own task.
#[derive(Debug)]
pub struct PendingVerdict {
    token: CancellationToken,
    handle: JoinHandle<Option<RiskVerdict>>,
}

impl PendingVerdict {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the verdict. `None` if the classification was cancelled.
    pub async fn wait(self) -> Option<RiskVerdict> {
        match self.handle.await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(error = %error, "classification task failed");
                None
            }
        }
    }
}
