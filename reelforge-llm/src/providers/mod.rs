pub mod openai;
pub mod anthropic;

pub use crate::config::Provider;

use crate::config::{ChatRequest, ChatResponse};
use crate::error::{LLMError, Result};
use async_trait::async_trait;

/// One chat-completion backend behind [`crate::LLMManager`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// False until a key is installed; calls then fail with `MissingApiKey`.
    fn has_api_key(&self) -> bool;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    fn available_models(&self) -> Vec<String>;
}

/// Map HTTP failures to provider errors, passing successful responses through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if status == 429 {
        return Err(LLMError::RateLimit);
    }

    if status == 401 || status == 403 {
        return Err(LLMError::AuthenticationFailed);
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        // Limit error message size
        let text: String = text.chars().take(500).collect();
        return Err(LLMError::InvalidResponse(format!("HTTP {}: {}", status, text)));
    }

    Ok(response)
}

/// Only alphanumerics, dash, underscore and dot; falls back to `default`.
pub(crate) fn sanitize_model(model: Option<&String>, default: &str) -> String {
    model
        .map(|m| {
            m.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
                .take(100)
                .collect::<String>()
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// First 8 characters of a key, for debug logs.
pub(crate) fn key_prefix(api_key: &str) -> &str {
    api_key.get(..8).unwrap_or("***")
}
