//! Error types for reelforge-spk

use reelforge_core::Error as CoreError;
use thiserror::Error;

/// Speech synthesis and assembly errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("No voice id configured")]
    MissingVoice,

    #[error("Missing credentials for {0}")]
    MissingCredentials(String),

    #[error("Segment {segment} has no speakable text after cleaning")]
    EmptyText { segment: String },

    #[error("Expected {expected} audio clips, got {actual}")]
    SegmentCountMismatch { expected: usize, actual: usize },

    #[error("Invalid segments: {0}")]
    InvalidSegments(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl SpeechError {
    /// Data-contract violations. These abort the run instead of being
    /// recorded as a collaborator hiccup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpeechError::MissingVoice
                | SpeechError::MissingCredentials(_)
                | SpeechError::EmptyText { .. }
                | SpeechError::SegmentCountMismatch { .. }
                | SpeechError::InvalidSegments(_)
        )
    }
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Core(inner) => inner,
            SpeechError::Io(inner) => CoreError::Io(inner),
            other if other.is_fatal() => CoreError::Validation(format!("Speech error: {}", other)),
            other => CoreError::External(format!("Speech error: {}", other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
