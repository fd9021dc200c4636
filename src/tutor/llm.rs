//! OpenRouter (OpenAI-compatible) chat completion client

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::ChatTurn;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// LLM call failures
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    /// Provider answered with a non-success status
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// Something that can answer a chat transcript
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, model: &str, messages: Vec<ChatTurn>, max_tokens: Option<u32>) -> Result<String, LlmError>;
}

/// Provider endpoint and credentials
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Extra headers (OpenRouter attribution)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![("X-Title".to_string(), "SmartSkill".to_string())],
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat completion client
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
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client: Arc::new(client),
            provider,
        }
    }

    /// Build from configuration; fails when no key is set
    pub fn from_config(config: &crate::config::Config) -> Result<Self, LlmError> {
        let key = config.api_key().ok_or(LlmError::MissingApiKey)?;
        Ok(Self::with_provider(
            ProviderConfig::openrouter(key.to_string()).with_base_url(&config.openrouter.base_url),
        ))
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }
}

#[async_trait]
impl ChatBackend for OpenRouterClient {
    async fn complete(&self, model: &str, messages: Vec<ChatTurn>, max_tokens: Option<u32>) -> Result<String, LlmError> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens,
        };

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .bearer_auth(&self.provider.api_key);
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }

        let response = req_builder.json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::warn!("LLM API error ({}): {}", status, message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| LlmError::Decode(format!("{} (body: {})", e, truncate(&body, 200))))?;
        Ok(extract_content(&raw))
    }
}

/// Backend used when no API key is configured; every call fails
#[derive(Debug, Default, Clone)]
pub struct UnconfiguredBackend;

#[async_trait]
impl ChatBackend for UnconfiguredBackend {
    async fn complete(&self, _model: &str, _messages: Vec<ChatTurn>, _max_tokens: Option<u32>) -> Result<String, LlmError> {
        Err(LlmError::MissingApiKey)
    }
}

/// Provider error text: `error.message` when present, else the raw body
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                truncate(body, 500).to_string()
            }
        })
}

/// Assistant text from a completion; content may be a string or an array
/// of `{type: "text", text}` parts
pub fn extract_content(raw: &Value) -> String {
    match raw.pointer("/choices/0/message/content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_as_string() {
        let raw = json!({"choices": [{"message": {"content": "Hello"}}]});
        assert_eq!(extract_content(&raw), "Hello");
    }

    #[test]
    fn content_as_parts() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hello "},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "world"}
        ]}}]});
        assert_eq!(extract_content(&raw), "Hello world");
    }

    #[test]
    fn missing_choices_is_empty() {
        assert_eq!(extract_content(&json!({"choices": []})), "");
        assert_eq!(extract_content(&json!({})), "");
    }

    #[test]
    fn error_message_prefers_provider_text() {
        assert_eq!(error_message(r#"{"error":{"message":"No credits"}}"#), "No credits");
        assert_eq!(error_message("Bad gateway"), "Bad gateway");
        assert_eq!(error_message(""), "Unknown error");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[tokio::test]
    async fn unconfigured_backend_reports_missing_key() {
        let err = UnconfiguredBackend.complete("m", vec![], None).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = ProviderConfig::openrouter("k".into()).with_base_url("http://localhost:9/v1/");
        assert_eq!(provider.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn request_skips_absent_max_tokens() {
        let req = ChatRequest {
            model: "m",
            messages: vec![ChatTurn::new("user", "hi")],
            max_tokens: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("max_tokens").is_none());
        assert_eq!(v["messages"][0]["role"], "user");
    }
}
