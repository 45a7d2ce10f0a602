use anyhow::{Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use tether_shared::schemas::{InterruptDecision, ModelInfo, SessionSummary, ToolInfo};

use crate::config::Configuration;

/// HTTP API client for one-off session CRUD and control fallbacks.
///
/// The streaming path never goes through here; this is the thin REST
/// collaborator the facade uses for create/list/delete, history paging,
/// and resume/stop when the socket transport is unavailable.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    session: SessionSummary,
}

#[derive(Deserialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<Value>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ToolsResponse {
    tools: Vec<ToolInfo>,
}

impl ApiClient {
    pub fn new(config: &Configuration) -> Result<Self> {
        if config.api_token.is_empty() {
            bail!(
                "TETHER_API_TOKEN is required. Run 'tether auth login' or set the TETHER_API_TOKEN environment variable."
            );
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
        })
    }

    pub async fn create_session(
        &self,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<SessionSummary> {
        let body = serde_json::json!({
            "title": title,
            "model": model,
        });

        let resp = self
            .http
            .post(format!("{}/api/sessions", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST /api/sessions failed ({status}): {text}");
        }

        let parsed: SessionResponse = resp.json().await?;
        Ok(parsed.session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionSummary> {
        let resp = self
            .http
            .get(format!("{}/api/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET /api/sessions/{session_id} failed ({status}): {text}");
        }

        let parsed: SessionResponse = resp.json().await?;
        Ok(parsed.session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let resp = self
            .http
            .get(format!("{}/api/sessions", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET /api/sessions failed ({status}): {text}");
        }

        let parsed: SessionsResponse = resp.json().await?;
        Ok(parsed.sessions)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/api/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("DELETE /api/sessions/{session_id} failed ({status}): {text}");
        }

        Ok(())
    }

    /// Page through persisted message history, oldest first.
    pub async fn get_messages(
        &self,
        session_id: &str,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<Value>> {
        let resp = self
            .http
            .get(format!(
                "{}/api/sessions/{}/messages?afterSeq={}&limit={}",
                self.base_url, session_id, after_seq, limit,
            ))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET messages failed ({status}): {text}");
        }

        let parsed: MessagesResponse = resp.json().await?;
        Ok(parsed.messages)
    }

    /// HTTP fallback for resuming an interrupt when the socket transport
    /// cannot carry control messages.
    pub async fn resume_interrupt(
        &self,
        session_id: &str,
        interrupt_id: &str,
        decision: InterruptDecision,
        value: Option<Value>,
    ) -> Result<()> {
        let body = serde_json::json!({
            "interruptId": interrupt_id,
            "decision": decision,
            "value": value,
        });

        let resp = self
            .http
            .post(format!(
                "{}/api/sessions/{}/resume",
                self.base_url, session_id,
            ))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST resume failed ({status}): {text}");
        }

        Ok(())
    }

    /// HTTP fallback for stopping generation. Advisory; failures are
    /// logged rather than raised.
    pub async fn stop(&self, session_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/api/sessions/{}/stop", self.base_url, session_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = %status, "stop request failed: {text}");
        }

        Ok(())
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let resp = self
            .http
            .get(format!("{}/api/models", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET /api/models failed ({status}): {text}");
        }

        let parsed: ModelsResponse = resp.json().await?;
        Ok(parsed.models)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let resp = self
            .http
            .get(format!("{}/api/tools", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET /api/tools failed ({status}): {text}");
        }

        let parsed: ToolsResponse = resp.json().await?;
        Ok(parsed.tools)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
