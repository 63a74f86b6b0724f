//! Contracts between SafeSurf components.
//!
//! Implementations live in other crates (safesurf-backend for the HTTP
//! client, safesurf-monitor for notifiers, etc.).

use crate::types::{ActionKind, CheckResponse, Notification};
use anyhow::Result;
use async_trait::async_trait;

/// The remote reputation service.
///
/// Errors are transport failures: unreachable backend, non-success status, or
/// an undecodable body. Retrying is the caller's business.
#[async_trait]
pub trait ReputationBackend: Send + Sync {
    /// `POST /check_url`.
    async fn check_url(&self, url: &str) -> Result<CheckResponse>;

    /// `POST /override_warning` or `POST /report_site`.
    async fn submit_action(&self, kind: ActionKind, url: &str) -> Result<()>;
}

/// Side-effecting desktop notification sink. Never fails the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}
