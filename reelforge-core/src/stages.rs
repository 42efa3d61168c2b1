//! Stage catalogue.

use crate::types::{Stage, StageStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const WEB_SCRAPING: &str = "web-scraping";
pub const AI_TEXT_CLEANER: &str = "ai-text-cleaner";
pub const AI_SUMMARY: &str = "ai-summary";
pub const VIRAL_HOOKS: &str = "viral-hooks";
pub const SCRIPT_GENERATION: &str = "script-generation";
pub const TIMELINE_CREATION: &str = "timeline-creation";
pub const BACKGROUND_SELECTION: &str = "background-selection";
pub const MUSIC_SOUND: &str = "music-sound";
pub const AVATAR_BEHAVIOR: &str = "avatar-behavior";
pub const THUMBNAIL_CONCEPT: &str = "thumbnail-concept";
pub const VOICE_GENERATION: &str = "voice-generation";
pub const AVATAR_GENERATION: &str = "avatar-generation";
pub const BACKGROUND_VIDEO: &str = "background-video";
pub const FINAL_MERGE: &str = "final-merge";

/// Static description of a stage, used to seed a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub service: String,
    #[serde(default)]
    pub ai_stage: bool,
    /// Unimplemented stages are created as `not_implemented` and never run.
    #[serde(default = "default_implemented")]
    pub implemented: bool,
}

fn default_implemented() -> bool {
    true
}

impl StageDefinition {
    pub fn new(id: &str, name: &str, description: &str, service: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            service: service.to_string(),
            ai_stage: false,
            implemented: true,
        }
    }

    pub fn ai(mut self) -> Self {
        self.ai_stage = true;
        self
    }

    pub fn not_implemented(mut self) -> Self {
        self.implemented = false;
        self
    }

    /// Fresh stage at the given 1-based position.
    pub fn to_stage(&self, order: u32) -> Stage {
        Stage {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            service: self.service.clone(),
            ai_stage: self.ai_stage,
            order,
            status: if self.implemented {
                StageStatus::Pending
            } else {
                StageStatus::NotImplemented
            },
            output: None,
            asset_refs: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// The fourteen production stages in execution order.
pub fn default_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(WEB_SCRAPING, "Web Scraping", "Extract page content", "content-source"),
        StageDefinition::new(AI_TEXT_CLEANER, "AI Text Cleaner", "Clean features and benefits", "text-generation").ai(),
        StageDefinition::new(AI_SUMMARY, "AI Summary Expert", "Product analysis", "text-generation").ai(),
        StageDefinition::new(VIRAL_HOOKS, "Viral Hooks Creator", "Attention-grabbing openers", "text-generation").ai(),
        StageDefinition::new(SCRIPT_GENERATION, "Video Script Writer", "Complete narration script", "text-generation").ai(),
        StageDefinition::new(TIMELINE_CREATION, "Timeline Creator", "Split script into timed segments", "timeline"),
        StageDefinition::new(BACKGROUND_SELECTION, "Background Selector", "Backgrounds and styles", "text-generation").ai(),
        StageDefinition::new(MUSIC_SOUND, "Music & Sound Expert", "Music and sound effects", "text-generation").ai(),
        StageDefinition::new(AVATAR_BEHAVIOR, "Avatar Behavior Expert", "Avatar gestures and behaviour", "text-generation").ai(),
        StageDefinition::new(THUMBNAIL_CONCEPT, "Thumbnail Creator", "Thumbnail concept", "text-generation").ai(),
        StageDefinition::new(VOICE_GENERATION, "Voice Generation", "Duration-constrained narration audio", "speech"),
        StageDefinition::new(AVATAR_GENERATION, "Avatar Generation", "AI avatar video", "avatar").not_implemented(),
        StageDefinition::new(BACKGROUND_VIDEO, "Background Video", "Background video rendering", "video").not_implemented(),
        StageDefinition::new(FINAL_MERGE, "Final Merge", "Merge audio and video", "ffmpeg").not_implemented(),
    ]
}

/// Materialize definitions into a 1-based ordered stage list.
pub fn build_stages(definitions: &[StageDefinition]) -> Vec<Stage> {
    definitions
        .iter()
        .enumerate()
        .map(|(i, d)| d.to_stage(i as u32 + 1))
        .collect()
}
