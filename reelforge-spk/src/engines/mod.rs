//! TTS engine implementations

pub mod elevenlabs;
pub mod openai;

use crate::calibration::{MAX_MULTIPLIER, MIN_MULTIPLIER};
use crate::config::VoiceRequest;
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use reelforge_core::config::{SpeechConfig, SpeechEngineKind};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

pub use elevenlabs::ElevenLabsEngine;
pub use openai::OpenAiTtsEngine;

/// A voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize text to encoded audio (mp3). The clip's real duration is
    /// only known after probing the bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceRequest) -> Result<Bytes, SpeechError>;

    /// Get available voices
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError>;

    /// Check if engine is available
    fn is_available(&self) -> bool;

    /// Get engine name
    fn name(&self) -> &str;

    /// Speaking rates the engine actually honours. Requests outside the
    /// range are clamped by the engine, so callers clamp first and record
    /// the rate that was applied.
    fn rate_range(&self) -> RangeInclusive<f64> {
        MIN_MULTIPLIER..=MAX_MULTIPLIER
    }
}

/// Build the engine selected in config.
pub fn build_engine(
    config: &SpeechConfig,
    openai_api_key: Option<String>,
) -> Result<Arc<dyn TtsEngine>, SpeechError> {
    let engine: Arc<dyn TtsEngine> = match config.engine {
        SpeechEngineKind::ElevenLabs => Arc::new(ElevenLabsEngine::from_config(config)?),
        SpeechEngineKind::OpenAI => Arc::new(OpenAiTtsEngine::from_config(config, openai_api_key)?),
    };
    Ok(engine)
}

/// Map a non-success response to an error, keeping at most 500 chars of body.
pub(crate) async fn check_status(
    engine: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SpeechError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let body: String = body.chars().take(500).collect();
    match status.as_u16() {
        429 => Err(SpeechError::RateLimit),
        401 | 403 => Err(SpeechError::AuthenticationFailed(format!("{} ({})", engine, status))),
        _ => Err(SpeechError::Api(format!("{} error ({}): {}", engine, status, body))),
    }
}

pub(crate) fn key_prefix(key: &str) -> &str {
    if key.len() > 8 && key.is_char_boundary(8) {
        &key[..8]
    } else {
        "***"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_engine_follows_config() {
        let config = SpeechConfig {
            engine: SpeechEngineKind::OpenAI,
            ..SpeechConfig::default()
        };
        let engine = build_engine(&config, Some("sk-test1234".to_string())).unwrap();
        assert_eq!(engine.name(), "OpenAI TTS");
        assert!(engine.is_available());

        let engine = build_engine(&SpeechConfig::default(), None).unwrap();
        assert_eq!(engine.name(), "ElevenLabs");
        assert!(!engine.is_available());
        assert_eq!(*engine.rate_range().end(), elevenlabs::MAX_SPEED);
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("xi-abcdefghijk"), "xi-abcde");
        assert_eq!(key_prefix("tiny"), "***");
    }
}
