use async_trait::async_trait;
use crate::config::*;
use crate::error::{LLMError, Result};
use crate::providers::{check_status, key_prefix, sanitize_model, ChatProvider};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

pub struct OpenAIProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            api_key: None,
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(api_key: String) -> Self {
        Self {
            api_key: Some(api_key),
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn get_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LLMError::MissingApiKey("OpenAI".to_string()))
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let api_key = self.get_api_key()?;
        let model = sanitize_model(request.model.as_ref(), Provider::OpenAI.default_model());

        // Limit max_tokens to prevent excessive API usage
        let max_tokens = request.max_tokens.map(|t| t.min(4096)).unwrap_or(2000);

        let body = json!({
            "model": model,
            "messages": request.messages.iter().map(|m| {
                json!({
                    "role": match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    "content": m.content
                })
            }).collect::<Vec<_>>(),
            "temperature": request.temperature.unwrap_or(0.7).clamp(0.0, 2.0),
            "max_tokens": max_tokens,
        });

        if !self.base_url.starts_with("https://") {
            return Err(LLMError::InvalidResponse("Invalid base URL".to_string()));
        }

        tracing::debug!("Making request to OpenAI with key {}...", key_prefix(api_key));

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let json: serde_json::Value = check_status(response).await?.json().await?;

        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::InvalidResponse("No choices in response".to_string()))?;

        let content = choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = json.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["prompt_tokens"].as_u64()? as u32,
                completion_tokens: u["completion_tokens"].as_u64()? as u32,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&model).to_string(),
            usage,
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
        })
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
        ]
    }
}
