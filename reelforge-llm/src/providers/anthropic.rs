use async_trait::async_trait;
use crate::config::*;
use crate::error::{LLMError, Result};
use crate::providers::{check_status, key_prefix, sanitize_model, ChatProvider};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

pub struct AnthropicProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            api_key: None,
            client: Client::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
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
            .ok_or_else(|| LLMError::MissingApiKey("Anthropic".to_string()))
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let api_key = self.get_api_key()?;
        let model = sanitize_model(request.model.as_ref(), Provider::Anthropic.default_model());

        // System prompts travel outside the message list
        let mut messages = Vec::new();
        let mut system = None;
        for msg in &request.messages {
            match msg.role {
                MessageRole::System => system = Some(msg.content.clone()),
                MessageRole::User => messages.push(json!({"role": "user", "content": msg.content})),
                MessageRole::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}))
                }
            }
        }

        let max_tokens = request.max_tokens.map(|t| t.min(4096)).unwrap_or(4096);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        if let Some(sys) = system {
            body["system"] = json!(sys);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp.clamp(0.0, 1.0));
        }

        if !self.base_url.starts_with("https://") {
            return Err(LLMError::InvalidResponse("Invalid base URL".to_string()));
        }

        tracing::debug!("Making request to Anthropic with key {}...", key_prefix(api_key));

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let json: serde_json::Value = check_status(response).await?.json().await?;

        let content = json["content"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = json.get("usage").and_then(|u| {
            let input = u["input_tokens"].as_u64()?;
            let output = u["output_tokens"].as_u64()?;
            Some(Usage {
                prompt_tokens: input as u32,
                completion_tokens: output as u32,
                total_tokens: (input + output) as u32,
            })
        });

        Ok(ChatResponse {
            content,
            model: json["model"].as_str().unwrap_or(&model).to_string(),
            usage,
            finish_reason: json["stop_reason"].as_str().map(|s| s.to_string()),
        })
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "claude-3-5-sonnet-20240620".to_string(),
            "claude-3-haiku-20240307".to_string(),
        ]
    }
}
