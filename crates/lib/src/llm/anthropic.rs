//! Messages API client (https://api.anthropic.com by default).
//! Streams `POST /v1/messages` as server-sent events and lists models.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::wire::{ApiErrorBody, ModelsResponse};
use crate::llm::{sse_events, EventStream, LlmBackend, LlmError, MessagesRequest, ModelInfo};
use crate::secrets::KeyStore;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Client for the Messages API. The API key is read from the key store on every request,
/// so a key saved while the client is alive takes effect on the next call.
#[derive(Clone)]
pub struct AnthropicClient {
    base_url: String,
    api_version: String,
    keys: Arc<dyn KeyStore>,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(base_url: Option<String>, keys: Arc<dyn KeyStore>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_version: DEFAULT_API_VERSION.to_string(),
            keys,
            client: reqwest::Client::new(),
        }
    }

    /// Override the `anthropic-version` header.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn api_key(&self) -> Result<String, LlmError> {
        self.keys
            .get_api_key()
            .await
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)
    }

    fn get(&self, path: &str, api_key: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.api_version)
    }

    /// Models available to the configured key (`GET /v1/models`).
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let api_key = self.api_key().await?;
        let res = self.get("/v1/models", &api_key).send().await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        let data: ModelsResponse = res.json().await?;
        Ok(data.data)
    }

    /// True if `api_key` is accepted by GET /v1/models.
    pub async fn validate_api_key(&self, api_key: &str) -> Result<bool, LlmError> {
        let res = self.get("/v1/models", api_key.trim()).send().await?;
        Ok(res.status().is_success())
    }

    /// POST /v1/messages with `stream: true`; returns the lazily decoded event stream.
    pub async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream, LlmError> {
        let api_key = self.api_key().await?;
        let body = MessagesRequest {
            stream: true,
            ..request
        };
        log::info!(
            "anthropic: streaming {} message(s) to model {}",
            body.messages.len(),
            body.model
        );
        let res = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        Ok(sse_events(res.bytes_stream()))
    }
}

#[async_trait]
impl LlmBackend for AnthropicClient {
    async fn stream_messages(&self, request: MessagesRequest) -> Result<EventStream, LlmError> {
        AnthropicClient::stream_messages(self, request).await
    }
}

/// Prefer the provider's `error.message`; fall back to status and raw body.
async fn error_from_response(res: reqwest::Response) -> LlmError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    LlmError::Api(api_error_message(status, &body))
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => format!("{} {}", status, body),
    }
}
