//! Correlates user actions sent to the monitor with their results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use safesurf_core::{ActionKind, ActionOutcome, ActionRequest};
use tokio::sync::oneshot;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

/// Outbound half of the page's channel to the monitor.
#[async_trait]
pub trait ActionLink: Send + Sync {
    async fn send(&self, request: &ActionRequest) -> Result<()>;
}

pub struct ActionRelay {
    link: Arc<dyn ActionLink>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ActionOutcome>>>,
}

impl std::fmt::Debug for ActionRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRelay")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ActionRelay {
    pub fn new(link: Arc<dyn ActionLink>) -> Self {
        Self {
            link,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send an action and wait for the monitor's answer.
    ///
    /// A send failure or a dropped connection both resolve to
    /// [`ActionOutcome::Failed`]; this never errors.
    pub async fn submit(&self, url: &str, kind: ActionKind) -> ActionOutcome {
        let request = ActionRequest::new(url, kind);
        let span = info_span!("action_relay", id = %request.id, kind = %kind, url = %url);

        async {
            let (tx, rx) = oneshot::channel();
            self.pending().insert(request.id, tx);
            let _entry = PendingEntry {
                relay: self,
                id: request.id,
            };

            if let Err(error) = self.link.send(&request).await {
                warn!(error = %format!("{error:#}"), "failed to send action");
                return ActionOutcome::Failed(format!("{error:#}"));
            }

            let outcome = rx
                .await
                .unwrap_or_else(|_| ActionOutcome::Failed("action abandoned".to_owned()));
            debug!(ok = outcome.is_ok(), "action resolved");
            outcome
        }
        .instrument(span)
        .await
    }

    /// Complete a pending action. Returns false for unknown or already
    /// completed ids.
    pub fn resolve(&self, id: Uuid, outcome: ActionOutcome) -> bool {
        let Some(tx) = self.pending().remove(&id) else {
            debug!(id = %id, "result for unknown action");
            return false;
        };
        tx.send(outcome).is_ok()
    }

    /// Fail every outstanding action, e.g. when the monitor went away.
    pub fn fail_pending(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.pending().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(ActionOutcome::Failed(reason.to_owned()));
        }
        if count > 0 {
            warn!(count, reason, "failed pending actions");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<ActionOutcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops the pending entry when `submit` ends, including when its task is
/// aborted while waiting.
struct PendingEntry<'a> {
    relay: &'a ActionRelay,
    id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.relay.pending().remove(&self.id);
    }
}
