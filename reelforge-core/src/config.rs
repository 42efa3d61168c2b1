// Layered configuration for Reelforge: defaults, then a file, then environment.

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Durable state store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Entries kept in the read-through run cache; 0 disables it.
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            cache_capacity: 256,
        }
    }
}

/// Pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base speaking speed used for script sizing and duration estimates.
    pub words_per_second: f64,
    pub min_target_duration: f64,
    pub max_target_duration: f64,
    pub timeline_segments: usize,
    /// Output strings starting with this prefix are recorded as assets.
    pub asset_prefix: String,
    /// Where generated artifacts are written; served under `asset_prefix`.
    pub output_dir: String,
    /// Scratch space for intermediate audio.
    pub work_dir: String,
    pub fetch_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            words_per_second: 2.3,
            min_target_duration: 3.0,
            max_target_duration: 60.0,
            timeline_segments: 5,
            asset_prefix: "/uploads/".to_string(),
            output_dir: "./uploads".to_string(),
            work_dir: "./work".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// Word budget for a script of the given length.
    pub fn target_words(&self, target_duration: f64) -> usize {
        (target_duration * self.words_per_second).floor() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    OpenAI,
    Anthropic,
}

/// Text generation collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::OpenAI,
            model: None,
            openai_api_key: None,
            anthropic_api_key: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngineKind {
    ElevenLabs,
    OpenAI,
}

/// Speech synthesis and audio assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: SpeechEngineKind,
    pub elevenlabs_api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: String,
    pub openai_voice: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub timeout_secs: u64,
    /// Overshoot above this many seconds is cut off.
    pub truncate_tolerance_secs: f64,
    /// Shortfall above this many seconds is padded with silence.
    pub pad_tolerance_secs: f64,
    pub min_text_chars: usize,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub sample_rate: u32,
    pub bitrate: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechEngineKind::ElevenLabs,
            elevenlabs_api_key: None,
            voice_id: None,
            model_id: "eleven_multilingual_v2".to_string(),
            openai_voice: "alloy".to_string(),
            stability: 0.7,
            similarity_boost: 0.8,
            style: 0.2,
            use_speaker_boost: true,
            timeout_secs: 60,
            truncate_tolerance_secs: 0.3,
            pad_tolerance_secs: 0.5,
            min_text_chars: 3,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            sample_rate: 44_100,
            bitrate: "128k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete Reelforge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelforgeConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

impl ReelforgeConfig {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, TOML or YAML)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<ReelforgeConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<ReelforgeConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<ReelforgeConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("REELFORGE_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("REELFORGE_HOST") {
            self.server.host = host;
        }
        if let Some(data_dir) = lookup("REELFORGE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Some(level) = lookup("REELFORGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key);
        }
        if let Some(key) = lookup("ELEVENLABS_API_KEY") {
            self.speech.elevenlabs_api_key = Some(key);
        }
        if let Some(voice) = lookup("ELEVENLABS_VOICE_ID") {
            self.speech.voice_id = Some(voice);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }

        let p = &self.pipeline;
        if p.words_per_second <= 0.0 {
            return Err(ConfigError::ValidationError(
                "pipeline.words_per_second must be > 0".to_string(),
            ));
        }
        if p.min_target_duration <= 0.0 || p.min_target_duration > p.max_target_duration {
            return Err(ConfigError::ValidationError(format!(
                "invalid target duration bounds {}..={}",
                p.min_target_duration, p.max_target_duration
            )));
        }
        if p.timeline_segments == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.timeline_segments must be > 0".to_string(),
            ));
        }
        if p.asset_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.asset_prefix cannot be empty".to_string(),
            ));
        }

        let s = &self.speech;
        if s.truncate_tolerance_secs < 0.0 || s.pad_tolerance_secs < 0.0 {
            return Err(ConfigError::ValidationError(
                "speech tolerances must be >= 0".to_string(),
            ));
        }
        if s.sample_rate == 0 {
            return Err(ConfigError::ValidationError(
                "speech.sample_rate cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
