//! OpenAI speech endpoint

use super::{check_status, key_prefix, TtsEngine, VoiceInfo};
use crate::config::{timeout, VoiceRequest};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;
use reelforge_core::config::SpeechConfig;
use reqwest::Client;
use serde_json::json;
use std::ops::RangeInclusive;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const MIN_SPEED: f64 = 0.25;
const MAX_SPEED: f64 = 4.0;
const VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

pub struct OpenAiTtsEngine {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    default_voice: String,
}

impl OpenAiTtsEngine {
    pub fn from_config(config: &SpeechConfig, api_key: Option<String>) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(timeout(config))
            .build()
            .map_err(|e| SpeechError::Engine(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: "tts-1".to_string(),
            default_voice: config.openai_voice.clone(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// OpenAI accepts speed in 0.25..=4.0.
    fn speed(rate: f64) -> f64 {
        if rate.is_finite() {
            rate.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        }
    }
}

#[async_trait]
impl TtsEngine for OpenAiTtsEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceRequest) -> Result<Bytes, SpeechError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SpeechError::MissingCredentials("OpenAI".to_string()))?;

        let voice_name = if voice.voice_id.trim().is_empty() {
            self.default_voice.as_str()
        } else {
            voice.voice_id.as_str()
        };

        debug!(voice = voice_name, key = key_prefix(api_key), "OpenAI TTS request");

        let request_body = json!({
            "model": self.model,
            "input": text,
            "voice": voice_name,
            "response_format": "mp3",
            "speed": Self::speed(voice.speaking_rate),
        });

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.endpoint))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request_body)
            .send()
            .await?;

        let response = check_status("OpenAI TTS", response).await?;
        Ok(response.bytes().await?)
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        // Fixed catalogue, no endpoint to query.
        Ok(VOICES
            .iter()
            .map(|v| VoiceInfo {
                id: v.to_string(),
                name: v.to_string(),
                category: None,
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &str {
        "OpenAI TTS"
    }

    fn rate_range(&self) -> RangeInclusive<f64> {
        MIN_SPEED..=MAX_SPEED
    }
}
