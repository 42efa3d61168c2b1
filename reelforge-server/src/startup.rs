// Startup wiring: logging, stores and collaborators built from config

use crate::http::ApiState;
use anyhow::Context;
use reelforge_core::config::{LoggingConfig, SpeechEngineKind};
use reelforge_core::ReelforgeConfig;
use reelforge_llm::{AssistantCatalog, LLMManager};
use reelforge_pipeline::{standard_registry, HttpContentSource, PipelineManager, PipelineRunner};
use reelforge_spk::{build_engine, AssemblerConfig, FfmpegToolkit, VoiceAssembler};
use reelforge_storage::{CachedRunStore, RunStore, SledRunStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

/// Open the durable store, with the read-through cache in front when enabled.
pub fn open_store(config: &ReelforgeConfig) -> anyhow::Result<Arc<dyn RunStore>> {
    let path = std::path::Path::new(&config.storage.data_dir).join("runs");
    let sled = SledRunStore::open(&path)
        .with_context(|| format!("failed to open run store at {}", path.display()))?;
    let store: Arc<dyn RunStore> = Arc::new(sled);
    if config.storage.cache_capacity == 0 {
        return Ok(store);
    }
    Ok(Arc::new(CachedRunStore::new(store, config.storage.cache_capacity)))
}

/// Build every collaborator and the runner that drives them.
pub async fn build_state(config: &ReelforgeConfig, store: Arc<dyn RunStore>) -> anyhow::Result<ApiState> {
    let generator = Arc::new(LLMManager::from_config(&config.llm));
    if !generator.is_configured() {
        warn!("No text generation provider has an API key; AI stages will fail");
    }
    let assistants = AssistantCatalog::defaults().with_default_model(config.llm.model.clone());

    let content = Arc::new(
        HttpContentSource::new(Duration::from_secs(config.pipeline.fetch_timeout_secs))
            .context("failed to build content source")?,
    );

    let engine = build_engine(&config.speech, config.llm.openai_api_key.clone())
        .context("failed to build speech engine")?;
    if !engine.is_available() {
        warn!(engine = engine.name(), "Speech engine has no credentials; voice generation will fail");
    }

    let media = FfmpegToolkit::from_config(&config.speech);
    if !media.is_available().await {
        warn!(ffmpeg = %config.speech.ffmpeg_path, "ffmpeg not found; voice generation will fail");
    }

    let assembler = Arc::new(VoiceAssembler::new(
        engine.clone(),
        Arc::new(media),
        AssemblerConfig::from_config(&config.speech, &config.pipeline),
    ));

    let voice_id = match config.speech.engine {
        SpeechEngineKind::ElevenLabs => config.speech.voice_id.clone(),
        SpeechEngineKind::OpenAI => config
            .speech
            .voice_id
            .clone()
            .or_else(|| Some(config.speech.openai_voice.clone())),
    };

    let registry = standard_registry(
        &config.pipeline,
        content,
        generator,
        assistants,
        assembler,
        voice_id,
    );
    info!(executors = registry.len(), engine = engine.name(), "Pipeline wired");

    let manager = Arc::new(PipelineManager::new(store, config.pipeline.clone()));
    let interrupted = manager
        .recover_interrupted()
        .await
        .context("failed to recover interrupted stages")?;
    if interrupted > 0 {
        warn!(stages = interrupted, "Stages left running by a previous process were marked as failed");
    }
    Ok(ApiState {
        runner: PipelineRunner::new(manager, registry),
        engine,
    })
}
