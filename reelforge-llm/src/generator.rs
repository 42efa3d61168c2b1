use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One stateless prompt: system instructions plus a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Text-in/text-out generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    fn name(&self) -> &str;
}
