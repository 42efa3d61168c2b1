//! ElevenLabs text-to-speech engine

use super::{check_status, key_prefix, TtsEngine, VoiceInfo};
use crate::config::{timeout, VoiceRequest, VoiceSettings};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use reelforge_core::config::SpeechConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::ops::RangeInclusive;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.elevenlabs.io";

/// Range accepted by the `speed` voice setting.
pub const MIN_SPEED: f64 = 0.7;
pub const MAX_SPEED: f64 = 1.2;

pub struct ElevenLabsEngine {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model_id: String,
    settings: VoiceSettings,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
}

impl ElevenLabsEngine {
    pub fn from_config(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(timeout(config))
            .build()
            .map_err(|e| SpeechError::Engine(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: config.elevenlabs_api_key.clone().filter(|k| !k.trim().is_empty()),
            model_id: config.model_id.clone(),
            settings: VoiceSettings::from(config),
        })
    }

    /// Point at a different base URL (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, SpeechError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| SpeechError::MissingCredentials("ElevenLabs".to_string()))
    }

    fn request_body(&self, text: &str, voice: &VoiceRequest) -> serde_json::Value {
        json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.settings.stability,
                "similarity_boost": self.settings.similarity_boost,
                "style": self.settings.style,
                "use_speaker_boost": self.settings.use_speaker_boost,
                "speed": clamp_speed(voice.speaking_rate),
            }
        })
    }
}

/// Clamp a multiplier into the engine's accepted range.
pub fn clamp_speed(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

#[async_trait]
impl TtsEngine for ElevenLabsEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceRequest) -> Result<Bytes, SpeechError> {
        let api_key = self.api_key()?;
        if voice.voice_id.trim().is_empty() {
            return Err(SpeechError::MissingVoice);
        }

        debug!(
            voice_id = %voice.voice_id,
            key = key_prefix(api_key),
            chars = text.len(),
            speed = clamp_speed(voice.speaking_rate),
            "ElevenLabs synthesis request"
        );

        let url = format!("{}/v1/text-to-speech/{}", self.endpoint, voice.voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&self.request_body(text, voice))
            .send()
            .await?;

        let response = check_status("ElevenLabs", response).await?;
        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::Api("ElevenLabs returned an empty clip".to_string()));
        }
        Ok(audio)
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/v1/voices", self.endpoint))
            .header("xi-api-key", api_key)
            .send()
            .await?;

        let response = check_status("ElevenLabs", response).await?;
        let voices: VoicesResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Api(format!("Failed to parse voices: {}", e)))?;

        Ok(voices
            .voices
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.voice_id,
                name: v.name,
                category: v.category,
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &str {
        "ElevenLabs"
    }

    fn rate_range(&self) -> RangeInclusive<f64> {
        MIN_SPEED..=MAX_SPEED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_is_clamped_to_engine_range() {
        assert_eq!(clamp_speed(1.8), MAX_SPEED);
        assert_eq!(clamp_speed(0.5), MIN_SPEED);
        assert_eq!(clamp_speed(1.1), 1.1);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
    }

    #[test]
    fn test_request_body_carries_voice_settings() {
        let config = SpeechConfig {
            elevenlabs_api_key: Some("xi-test-key".to_string()),
            ..SpeechConfig::default()
        };
        let engine = ElevenLabsEngine::from_config(&config).unwrap();
        let body = engine.request_body("Hello there", &VoiceRequest::new("v1", 1.25));
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["speed"], 1.2);
        assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let engine = ElevenLabsEngine::from_config(&SpeechConfig::default()).unwrap();
        let err = engine
            .synthesize("hello", &VoiceRequest::new("v1", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::MissingCredentials(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_blank_voice_is_rejected() {
        let config = SpeechConfig {
            elevenlabs_api_key: Some("xi-test-key".to_string()),
            ..SpeechConfig::default()
        };
        let engine = ElevenLabsEngine::from_config(&config).unwrap();
        let err = engine
            .synthesize("hello", &VoiceRequest::new("  ", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::MissingVoice));
    }
}
