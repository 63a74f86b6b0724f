//! Fake implementations for testing.
#![allow(clippy::unwrap_used)]

use crate::traits::{Notifier, ReputationBackend};
use crate::types::{ActionKind, CheckResponse, Notification};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Scripted reputation backend.
///
/// Queued replies are consumed first, one per `check_url` call; after that
/// the standing reply is used. Every call is recorded before any delay, so
/// counts reflect requests issued rather than requests completed.
#[derive(Debug)]
pub struct FakeBackend {
    queued: Mutex<VecDeque<Option<CheckResponse>>>,
    standing: Mutex<Option<CheckResponse>>,
    delays: Mutex<HashMap<String, Duration>>,
    action_error: Mutex<Option<String>>,
    check_calls: Mutex<Vec<String>>,
    action_calls: Mutex<Vec<(ActionKind, String)>>,
}

impl FakeBackend {
    /// Backend that answers every check with `risk` and `reason`.
    pub fn responding(risk: i64, reason: impl Into<String>) -> Self {
        Self::with_standing(Some(CheckResponse::new(risk, reason)))
    }

    /// Backend whose every check fails at the transport level.
    pub fn failing() -> Self {
        Self::with_standing(None)
    }

    fn with_standing(standing: Option<CheckResponse>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            standing: Mutex::new(standing),
            delays: Mutex::new(HashMap::new()),
            action_error: Mutex::new(None),
            check_calls: Mutex::new(Vec::new()),
            action_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: CheckResponse) {
        self.queued.lock().unwrap().push_back(Some(response));
    }

    pub fn push_failure(&self) {
        self.queued.lock().unwrap().push_back(None);
    }

    /// Delay replies for one URL, simulating a slow lookup.
    pub fn set_delay(&self, url: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(url.into(), delay);
    }

    /// Make every subsequent override/report fail with `message`.
    pub fn fail_actions(&self, message: impl Into<String>) {
        *self.action_error.lock().unwrap() = Some(message.into());
    }

    pub fn check_count(&self) -> usize {
        self.check_calls.lock().unwrap().len()
    }

    pub fn action_calls(&self) -> Vec<(ActionKind, String)> {
        self.action_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReputationBackend for FakeBackend {
    async fn check_url(&self, url: &str) -> Result<CheckResponse> {
        self.check_calls.lock().unwrap().push(url.to_owned());
        let reply = match self.queued.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => self.standing.lock().unwrap().clone(),
        };

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(response) => Ok(response),
            None => anyhow::bail!("connection refused"),
        }
    }

    async fn submit_action(&self, kind: ActionKind, url: &str) -> Result<()> {
        self.action_calls
            .lock()
            .unwrap()
            .push((kind, url.to_owned()));
        let error = self.action_error.lock().unwrap().clone();
        match error {
            Some(message) => anyhow::bail!(message),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}
