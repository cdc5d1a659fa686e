//! Chat-completion clients for the supported providers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::PwgenError;
use crate::prompt::Prompt;
use crate::settings::Provider;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 5000;
const APP_TITLE: &str = "Playwright Script Generator";

/// Turns a prompt into completion text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, PwgenError>;
}

/// OpenAI-compatible chat completions over HTTP
pub struct HttpCompletionClient {
    client: reqwest::Client,
    provider: Provider,
}

impl HttpCompletionClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    /// Bound every request by `timeout`. Without it a stalled provider
    /// stalls the cycle until the connection itself fails.
    pub fn with_timeout(provider: Provider, timeout: Duration) -> Result<Self, PwgenError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PwgenError::Config(e.to_string()))?;
        Ok(Self { client, provider })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });
        if let Provider::OpenRouter { model, .. } = &self.provider {
            body["model"] = json!(model);
        }
        body
    }

    fn build_request(&self, prompt: &Prompt) -> reqwest::RequestBuilder {
        let request = match &self.provider {
            Provider::OpenRouter {
                base_url, api_key, ..
            } => self
                .client
                .post(format!("{}/chat/completions", base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("X-Title", APP_TITLE),
            Provider::Azure { url, api_key } => {
                self.client.post(url).header("api-key", api_key.as_str())
            }
        };
        request.json(&self.request_body(prompt))
    }
}

/// Pull `choices[0].message.content` out of a completion body
pub fn extract_content(body: &Value) -> Result<String, PwgenError> {
    body.get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            let raw = body.to_string();
            warn!("Completion body missing choices[0].message.content: {}", raw);
            PwgenError::content("response has no choices[0].message.content", raw)
        })
}

fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    match message {
        Some(message) => format!("LLM request failed: {} ({})", status, message),
        None => format!("LLM request failed: {}", status),
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, PwgenError> {
        info!("Requesting completion from {}", self.provider.name());

        let response = self
            .build_request(prompt)
            .send()
            .await
            .map_err(|e| PwgenError::Transport(format!("LLM request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PwgenError::Transport(format!("LLM response unreadable: {}", e)))?;

        if !status.is_success() {
            debug!("Completion error body: {}", text);
            return Err(PwgenError::Transport(error_detail(status, &text)));
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            warn!("Completion body is not JSON: {}", text);
            PwgenError::content(format!("response is not JSON: {}", e), text.clone())
        })?;
        extract_content(&body)
    }
}

/// A model offered by OpenRouter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl ModelInfo {
    pub fn is_free(&self) -> bool {
        self.id.ends_with(":free")
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// Key validation and model listing against the OpenRouter API
pub struct OpenRouterCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Check an API key against `GET /auth/key`
    pub async fn validate_key(&self, api_key: &str) -> Result<(), PwgenError> {
        let response = self
            .client
            .get(format!("{}/auth/key", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| PwgenError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PwgenError::InvalidInput("Invalid API key".to_string()));
        }
        Ok(())
    }

    /// List available models, optionally only the free ones
    pub async fn list_models(&self, free_only: bool) -> Result<Vec<ModelInfo>, PwgenError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(|e| PwgenError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PwgenError::Transport(format!(
                "Failed to fetch models: {}",
                response.status()
            )));
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| PwgenError::content(format!("malformed model list: {}", e), ""))?;
        Ok(list
            .data
            .into_iter()
            .filter(|m| !free_only || m.is_free())
            .collect())
    }
}

#[cfg(test)]
#[path = "completion_test.rs"]
mod completion_test;
