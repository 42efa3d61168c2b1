//! Stage executors for the default catalogue.

pub mod scrape;
pub mod prompt;
pub mod timeline;
pub mod voice;

pub use scrape::ScrapeExecutor;
pub use prompt::PromptExecutor;
pub use timeline::TimelineExecutor;
pub use voice::VoiceExecutor;

use crate::content::ContentSource;
use crate::executor::ExecutorRegistry;
use reelforge_core::config::PipelineConfig;
use reelforge_core::stages::*;
use reelforge_llm::{AssistantCatalog, TextGenerator};
use reelforge_spk::VoiceAssembler;
use std::sync::Arc;

/// Registry wired with an executor for every implemented default stage.
pub fn standard_registry(
    config: &PipelineConfig,
    content: Arc<dyn ContentSource>,
    generator: Arc<dyn TextGenerator>,
    assistants: AssistantCatalog,
    assembler: Arc<VoiceAssembler>,
    voice_id: Option<String>,
) -> ExecutorRegistry {
    let prompt = Arc::new(PromptExecutor::new(generator, assistants, config.words_per_second));
    let mut registry = ExecutorRegistry::new()
        .with(WEB_SCRAPING, Arc::new(ScrapeExecutor::new(content)))
        .with(TIMELINE_CREATION, Arc::new(TimelineExecutor::new(config.timeline_segments)))
        .with(
            VOICE_GENERATION,
            Arc::new(VoiceExecutor::new(assembler, voice_id, config)),
        );
    for stage_id in [
        AI_TEXT_CLEANER,
        AI_SUMMARY,
        VIRAL_HOOKS,
        SCRIPT_GENERATION,
        BACKGROUND_SELECTION,
        MUSIC_SOUND,
        AVATAR_BEHAVIOR,
        THUMBNAIL_CONCEPT,
    ] {
        registry.register(stage_id, prompt.clone());
    }
    registry
}
