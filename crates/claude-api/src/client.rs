use std::time::Duration;

use forge_core::config::LlmConfig;
use tracing::{debug, warn};

use crate::types::{ErrorResponse, MessagesRequest, MessagesResponse, RequestMessage};
use crate::{ClaudeApiError, Result};

/// Value sent in the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";

// ─── ClaudeClient ─────────────────────────────────────────────────────────

/// Minimal client for the Anthropic Messages API.
///
/// One call is one HTTP request: no retries, no streaming. Callers decide
/// what a failure means for them.
#[derive(Clone)]
pub struct ClaudeClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl ClaudeClient {
    /// Build a client from config, reading the key from the environment
    /// variable named by `cfg.api_key_env`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClaudeApiError::MissingApiKey(cfg.api_key_env.clone()))?;
        Self::with_api_key(cfg, api_key)
    }

    pub fn with_api_key(cfg: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single-turn prompt and return the concatenated text reply.
    pub async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.map(str::to_string),
            messages: vec![RequestMessage::user(prompt)],
            temperature: None,
        };
        let response = self.send(&request).await?;
        if response.truncated() {
            warn!(model = %response.model, "response hit max_tokens and may be incomplete");
        }
        response.text().ok_or(ClaudeApiError::EmptyResponse)
    }

    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/v1/messages", self.api_base);
        debug!(model = %request.model, url = %url, "sending messages request");

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| format!("{}: {}", e.error.kind, e.error.message))
                .unwrap_or(body);
            warn!(status = status.as_u16(), "messages request failed");
            return Err(ClaudeApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        debug!(
            id = %parsed.id,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "messages request completed"
        );
        Ok(parsed)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
