use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key not set for provider: {0}")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),
}

impl LLMError {
    /// Configuration problems, as opposed to a failing remote service.
    pub fn is_configuration(&self) -> bool {
        matches!(self, LLMError::MissingApiKey(_) | LLMError::AuthenticationFailed)
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
