//! Completion client
//!
//! The engine needs exactly one operation from a language model:
//! `complete(prompt, options) -> text`. The trait keeps the roles testable
//! with stub clients; the provided implementation speaks the
//! OpenAI-compatible chat API (OpenRouter and friends).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Per-call options for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Model id, e.g. `meta-llama/llama-3.1-8b-instruct`.
    pub model: String,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: Some(2048),
        }
    }
}

/// The single operation the engine requires from a language model backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and return the raw response text.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

/// Configuration for an OpenAI-compatible chat completion provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g. "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// API key for bearer authentication
    pub api_key: String,
    /// Extra headers to include in requests (e.g. X-Title)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Create an OpenRouter provider configuration.
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![(
                "X-Title".to_string(),
                "playbook-engine".to_string(),
            )],
        }
    }

    /// A provider with a custom base URL (any OpenAI-compatible endpoint).
    pub fn custom(api_key: String, base_url: String) -> Self {
        Self {
            base_url,
            api_key,
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat-completion client for OpenRouter and other OpenAI-compatible APIs.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Self {
        Self::with_provider(ProviderConfig::openrouter(api_key))
    }

    pub fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider,
        }
    }

    /// Create a client from the `OPENROUTER_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY is not set")?;
        Ok(Self::new(api_key))
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let request = ChatRequest {
            model: options.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
        };

        debug!(model = options.model.as_str(), prompt_len = prompt.len(), "sending completion request");

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, body);
        }

        let body = response.text().await.context("Failed to read response body")?;

        // Parse as raw Value first for maximum provider compatibility.
        // Strict struct deserialization breaks on models that return
        // non-standard field types.
        let raw: serde_json::Value =
            serde_json::from_str(body.trim()).context("Failed to parse JSON response")?;

        let content_value = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"));

        // Content may arrive as a plain string or as an array of content
        // parts depending on the model.
        let content = match content_value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| {
                    if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                        part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        };

        Ok(content)
    }
}
