use crate::config::*;
use crate::error::{LLMError, Result};
use crate::generator::{GenerationRequest, TextGenerator};
use crate::providers::{anthropic::AnthropicProvider, openai::OpenAIProvider, ChatProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub struct LLMManager {
    providers: HashMap<Provider, Box<dyn ChatProvider>>,
    default_provider: Option<Provider>,
    config: LLMConfig,
}

impl LLMManager {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: config.default_provider,
            config,
        }
    }

    /// Build a manager with every provider that has a key in `config`.
    pub fn from_config(config: &reelforge_core::config::LlmConfig) -> Self {
        let mut manager = Self::new(LLMConfig::from(config));
        if let Some(key) = &config.openai_api_key {
            manager.set_api_key(Provider::OpenAI, key.clone());
        }
        if let Some(key) = &config.anthropic_api_key {
            manager.set_api_key(Provider::Anthropic, key.clone());
        }
        manager
    }

    /// Set API key for a provider
    pub fn set_api_key(&mut self, provider: Provider, key: String) {
        if key.is_empty() {
            tracing::warn!("Empty API key provided for {:?}", provider);
            return;
        }

        if key.len() > 1000 {
            tracing::warn!("API key too long for {:?}", provider);
            return;
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let boxed: Box<dyn ChatProvider> = match provider {
            Provider::OpenAI => Box::new(OpenAIProvider::with_api_key(key).with_timeout(timeout)),
            Provider::Anthropic => {
                Box::new(AnthropicProvider::with_api_key(key).with_timeout(timeout))
            }
        };
        self.register(provider, boxed);
    }

    /// Install a provider implementation directly.
    pub fn register(&mut self, provider: Provider, implementation: Box<dyn ChatProvider>) {
        self.providers.insert(provider, implementation);
        if self.default_provider.is_none() {
            self.default_provider = Some(provider);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.default_provider
            .map(|p| self.providers.contains_key(&p))
            .unwrap_or(false)
    }

    fn get_provider(&self, provider: Option<Provider>) -> Result<(Provider, &dyn ChatProvider)> {
        let provider = provider
            .or(self.default_provider)
            .ok_or_else(|| LLMError::MissingApiKey("No provider configured".to_string()))?;
        let implementation = self
            .providers
            .get(&provider)
            .ok_or_else(|| LLMError::MissingApiKey(format!("Provider {:?} not configured", provider)))?;
        Ok((provider, implementation.as_ref()))
    }

    /// Chat completion. Every call reaches the provider; a retried stage
    /// must get a fresh reply.
    pub async fn chat(&self, request: ChatRequest, provider: Option<Provider>) -> Result<String> {
        if request.messages.is_empty() {
            return Err(LLMError::InvalidRequest("Messages cannot be empty".to_string()));
        }

        if request.messages.len() > 100 {
            return Err(LLMError::InvalidRequest("Too many messages (max 100)".to_string()));
        }

        if request.messages.iter().any(|m| m.content.len() > 100_000) {
            return Err(LLMError::InvalidRequest(
                "Individual message too large (max 100KB)".to_string(),
            ));
        }

        let (provider, implementation) = self.get_provider(provider)?;

        let response = implementation.chat(request).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                provider = provider.as_str(),
                model = %response.model,
                total_tokens = usage.total_tokens,
                "chat completed"
            );
        }

        if response.content.trim().is_empty() {
            return Err(LLMError::InvalidResponse("Empty completion".to_string()));
        }

        Ok(response.content)
    }
}

#[async_trait]
impl TextGenerator for LLMManager {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let chat = ChatRequest {
            messages: vec![Message::system(request.system), Message::user(request.user)],
            model: request.model.or_else(|| self.config.default_model.clone()),
            temperature: request.temperature.or(Some(self.config.temperature)),
            max_tokens: request.max_tokens.or(self.config.max_tokens),
        };
        self.chat(chat, None).await
    }

    fn name(&self) -> &str {
        self.default_provider.map(|p| p.as_str()).unwrap_or("unconfigured")
    }
}
