//! Runtime settings for engines and the voice assembler, derived from
//! `reelforge_core::config::SpeechConfig`.

use reelforge_core::config::{PipelineConfig, SpeechConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Voice shaping parameters sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.7,
            similarity_boost: 0.8,
            style: 0.2,
            use_speaker_boost: true,
        }
    }
}

impl From<&SpeechConfig> for VoiceSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            stability: config.stability.clamp(0.0, 1.0),
            similarity_boost: config.similarity_boost.clamp(0.0, 1.0),
            style: config.style.clamp(0.0, 1.0),
            use_speaker_boost: config.use_speaker_boost,
        }
    }
}

/// One synthesis request: who speaks and how fast.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRequest {
    pub voice_id: String,
    /// Speaking-rate multiplier, 1.0 = natural pace.
    pub speaking_rate: f64,
}

impl VoiceRequest {
    pub fn new(voice_id: impl Into<String>, speaking_rate: f64) -> Self {
        Self {
            voice_id: voice_id.into(),
            speaking_rate,
        }
    }
}

/// Tunables for `VoiceAssembler`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerConfig {
    pub words_per_second: f64,
    pub truncate_tolerance_secs: f64,
    pub pad_tolerance_secs: f64,
    /// Minimum cleaned characters per segment.
    pub min_text_chars: usize,
    /// Estimated/allotted ratio above which a segment is shortened.
    pub overrun_ratio: f64,
    /// Truncated text is sized for this multiple of the allotted time.
    pub truncate_ratio: f64,
    pub sample_rate: u32,
    pub bitrate: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            words_per_second: 2.3,
            truncate_tolerance_secs: 0.3,
            pad_tolerance_secs: 0.5,
            min_text_chars: 3,
            overrun_ratio: 1.2,
            truncate_ratio: 1.15,
            sample_rate: 44_100,
            bitrate: "128k".to_string(),
        }
    }
}

impl AssemblerConfig {
    pub fn from_config(speech: &SpeechConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            words_per_second: pipeline.words_per_second,
            truncate_tolerance_secs: speech.truncate_tolerance_secs,
            pad_tolerance_secs: speech.pad_tolerance_secs,
            min_text_chars: speech.min_text_chars,
            sample_rate: speech.sample_rate,
            bitrate: speech.bitrate.clone(),
            ..Self::default()
        }
    }
}

pub(crate) fn timeout(config: &SpeechConfig) -> Duration {
    Duration::from_secs(config.timeout_secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_settings_are_clamped() {
        let speech = SpeechConfig {
            stability: 1.7,
            style: -0.2,
            ..SpeechConfig::default()
        };
        let settings = VoiceSettings::from(&speech);
        assert_eq!(settings.stability, 1.0);
        assert_eq!(settings.style, 0.0);
        assert_eq!(settings.similarity_boost, 0.8);
    }

    #[test]
    fn test_assembler_config_follows_core_config() {
        let speech = SpeechConfig {
            truncate_tolerance_secs: 0.25,
            ..SpeechConfig::default()
        };
        let pipeline = PipelineConfig {
            words_per_second: 2.5,
            ..PipelineConfig::default()
        };
        let config = AssemblerConfig::from_config(&speech, &pipeline);
        assert_eq!(config.words_per_second, 2.5);
        assert_eq!(config.truncate_tolerance_secs, 0.25);
        assert_eq!(config.pad_tolerance_secs, 0.5);
        assert_eq!(config.overrun_ratio, 1.2);
    }
}
