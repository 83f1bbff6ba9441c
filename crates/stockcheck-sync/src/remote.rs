//! # Remote Sync Endpoint
//!
//! The backend side of the pull/push protocol.
//!
//! ```text
//! ┌──────────────────────┐   PullRequest    ┌─────────────────────────────┐
//! │                      │ ───────────────► │                             │
//! │  SyncOrchestrator    │ ◄─────────────── │  RemoteEndpoint             │
//! │                      │   raw JSON       │  ├── HttpRemote (reqwest)   │
//! │                      │   PushRequest    │  └── test fakes             │
//! │                      │ ───────────────► │                             │
//! └──────────────────────┘                  └─────────────────────────────┘
//! ```
//!
//! `pull` hands back raw JSON on purpose: shape normalization happens once,
//! in the orchestrator, whatever endpoint is plugged in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullRequest, PushRequest, RemoteErrorBody};

/// The backend's pull/push procedures.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Fetches changes newer than the request's watermark.
    ///
    /// Transport or application failures are `Err`. A successful call may
    /// still return `null` or an unexpected shape.
    async fn pull(&self, request: PullRequest) -> SyncResult<Value>;

    /// Uploads local changes. Success means the backend accepted all of them.
    async fn push(&self, request: PushRequest) -> SyncResult<()>;
}

// =============================================================================
// HTTP Remote
// =============================================================================

/// PostgREST-style RPC client: `POST {base}/rest/v1/rpc/{procedure}`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    pull_url: Url,
    push_url: Url,
    api_key: Option<String>,
}

impl HttpRemote {
    /// Creates a client for the backend at `base_url`.
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        pull_procedure: &str,
        push_procedure: &str,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpRemote {
            client,
            pull_url: rpc_url(&base_url, pull_procedure)?,
            push_url: rpc_url(&base_url, push_procedure)?,
            api_key,
        })
    }

    /// Builds the client from the `[remote]` section.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(
            config.remote_url()?,
            config.remote.api_key.clone(),
            &config.remote.pull_procedure,
            &config.remote.push_procedure,
            config.request_timeout(),
        )
    }

    pub fn pull_url(&self) -> &Url {
        &self.pull_url
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    async fn call<B: Serialize + Sync>(
        &self,
        url: &Url,
        body: &B,
        fail: fn(String) -> SyncError,
    ) -> SyncResult<Response> {
        let mut request = self.client.post(url.clone()).json(body);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: RemoteErrorBody = response.json().await.unwrap_or_default();
        let message = body.describe(status.as_u16());
        warn!(%url, status = status.as_u16(), error = %message, "Remote call rejected");

        Err(fail(message))
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn pull(&self, request: PullRequest) -> SyncResult<Value> {
        debug!(last_pulled_at = %request.last_pulled_at, "Calling pull");

        let response = self
            .call(&self.pull_url, &request, SyncError::PullFailed)
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| SyncError::MalformedResponse(format!("pull body is not JSON: {e}")))
    }

    async fn push(&self, request: PushRequest) -> SyncResult<()> {
        debug!(records = request.changes.record_count(), "Calling push");

        self.call(&self.push_url, &request, SyncError::PushFailed)
            .await?;
        Ok(())
    }
}

/// `{base}/rest/v1/rpc/{procedure}`, keeping any path prefix of `base`.
fn rpc_url(base: &Url, procedure: &str) -> SyncResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(&format!("rest/v1/rpc/{procedure}"))?)
}
