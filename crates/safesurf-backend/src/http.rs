//! HTTP client for the SafeSurf reputation service.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use safesurf_core::{ActionKind, CheckResponse, ReputationBackend};

const CHECK_URL_PATH: &str = "/check_url";
const PING_PATH: &str = "/ping";

/// Longest error body excerpt kept in a transport error.
const ERROR_BODY_LIMIT: usize = 500;

/// Endpoint path for a user action.
pub fn action_path(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Override => "/override_warning",
        ActionKind::Report => "/report_site",
    }
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    #[serde(default)]
    status: String,
}

/// JSON-over-HTTP reputation backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        debug!(base_url = %base_url, timeout_ms = timeout.as_millis(), "creating backend client");

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {path}"))?;
        ensure_success(response).await
    }

    /// `GET /ping`; returns the reported status line.
    pub async fn ping(&self) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint(PING_PATH))
            .send()
            .await
            .context("failed to reach backend")?;
        let response = ensure_success(response).await?;
        let body: PingResponse = response
            .json()
            .await
            .context("failed to decode ping response")?;
        Ok(body.status)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let end = body.floor_char_boundary(ERROR_BODY_LIMIT);
    bail!("HTTP {status}: {}", &body[..end]);
}

#[async_trait]
impl ReputationBackend for HttpBackend {
    async fn check_url(&self, url: &str) -> Result<CheckResponse> {
        let response = self.post_json(CHECK_URL_PATH, &json!({ "url": url })).await?;
        let status = response.status();
        debug!(status = %status, "check_url response");
        response
            .json::<CheckResponse>()
            .await
            .context("failed to decode check_url response")
    }

    async fn submit_action(&self, kind: ActionKind, url: &str) -> Result<()> {
        // Any success body counts as acknowledgment.
        self.post_json(action_path(kind), &json!({ "url": url }))
            .await
            .map(drop)
    }
}
