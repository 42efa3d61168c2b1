//! Prompt presets for the text-generation stages.
//!
//! Templates use `{name}` placeholders. Unknown placeholders are left as-is
//! so a missing value is visible in the prompt instead of silently empty.

use crate::generator::GenerationRequest;
use reelforge_core::stages::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantPreset {
    pub stage_id: String,
    pub instructions: String,
    pub user_template: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AssistantPreset {
    fn new(stage_id: &str, instructions: &str, user_template: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            instructions: instructions.to_string(),
            user_template: user_template.to_string(),
            model: None,
            temperature,
            max_tokens,
        }
    }

    /// Fill both templates from `vars` and build the request.
    pub fn request(&self, vars: &HashMap<&str, String>) -> GenerationRequest {
        GenerationRequest {
            system: render(&self.instructions, vars),
            user: render(&self.user_template, vars),
            model: self.model.clone(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }
}

/// Replace every `{key}` whose key is present in `vars`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if vars.contains_key(&after[..close]) => {
                out.push_str(&vars[&after[..close]]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Presets keyed by stage id.
#[derive(Debug, Clone, Default)]
pub struct AssistantCatalog {
    presets: HashMap<String, AssistantPreset>,
}

impl AssistantCatalog {
    pub fn get(&self, stage_id: &str) -> Option<&AssistantPreset> {
        self.presets.get(stage_id)
    }

    /// Replace or add a preset.
    pub fn insert(&mut self, preset: AssistantPreset) {
        self.presets.insert(preset.stage_id.clone(), preset);
    }

    /// Apply a model to every preset that does not pin one.
    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            for preset in self.presets.values_mut() {
                preset.model.get_or_insert_with(|| model.clone());
            }
        }
        self
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn defaults() -> Self {
        let mut catalog = Self::default();
        for preset in [
            AssistantPreset::new(
                AI_TEXT_CLEANER,
                "You clean scraped product pages. Remove navigation, cookie notices, prices \
                 tables and boilerplate. Keep the product name, features and benefits as plain \
                 sentences. Answer with the cleaned text only.",
                "Clean and enrich this scraped content:\n\n{content}",
                0.3,
                1200,
            ),
            AssistantPreset::new(
                AI_SUMMARY,
                "You are a product analyst. Summarise what the product is, who it is for and \
                 its three strongest benefits in under 120 words.",
                "Analyse this page content:\n\n{content}",
                0.7,
                500,
            ),
            AssistantPreset::new(
                VIRAL_HOOKS,
                "You write opening lines for {target_duration}-second promotional videos. \
                 Return five hooks, one per line, no numbering, each under 12 words.",
                "Product: {summary}",
                0.9,
                300,
            ),
            AssistantPreset::new(
                SCRIPT_GENERATION,
                "You write voiceover scripts for {target_duration}-second videos. Write between \
                 {min_words} and {target_words} spoken words. Start with the hook \"{hook}\". \
                 Output only the words to be spoken: no stage directions, no speaker labels, \
                 no brackets, no markdown.",
                "Product: {summary}\nStart with: {hook}",
                0.8,
                800,
            ),
            AssistantPreset::new(
                BACKGROUND_SELECTION,
                "You are a video art director. Propose background scenes and a colour style \
                 for each part of the script.",
                "Product: {summary}\nScript: {script}",
                0.7,
                500,
            ),
            AssistantPreset::new(
                MUSIC_SOUND,
                "You are a sound designer. Suggest a music genre, tempo and up to three sound \
                 effects with timestamps.",
                "Script: {script}\nHooks: {hooks}",
                0.7,
                400,
            ),
            AssistantPreset::new(
                AVATAR_BEHAVIOR,
                "You direct an on-screen presenter. Describe gestures and expressions for each \
                 timeline segment.",
                "Script: {script}\nTimeline: {timeline}",
                0.6,
                500,
            ),
            AssistantPreset::new(
                THUMBNAIL_CONCEPT,
                "You design video thumbnails. Describe one thumbnail: composition, text overlay \
                 of at most five words and colours.",
                "Hook: {hook}\nProduct: {summary}\nBackground: {background}",
                0.8,
                300,
            ),
        ] {
            catalog.insert(preset);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_known_and_unknown_placeholders() {
        let v = vars(&[("name", "Reel"), ("n", "3")]);
        assert_eq!(render("Hi {name}, {n} clips", &v), "Hi Reel, 3 clips");
        assert_eq!(render("keep {missing} and {", &v), "keep {missing} and {");
        assert_eq!(render("{name}{name}", &v), "ReelReel");
    }

    #[test]
    fn test_script_preset_carries_word_budget() {
        let catalog = AssistantCatalog::defaults();
        let preset = catalog.get(SCRIPT_GENERATION).unwrap();
        let request = preset.request(&vars(&[
            ("target_duration", "15"),
            ("target_words", "34"),
            ("min_words", "29"),
            ("hook", "Stop scrolling"),
            ("summary", "A smart mug"),
        ]));
        assert!(request.system.contains("between 29 and 34"));
        assert!(request.user.contains("Start with: Stop scrolling"));
        assert_eq!(request.max_tokens, Some(800));
    }

    #[test]
    fn test_every_ai_stage_has_a_preset() {
        let catalog = AssistantCatalog::defaults();
        for def in reelforge_core::default_stages().iter().filter(|d| d.ai_stage) {
            assert!(catalog.get(&def.id).is_some(), "missing preset for {}", def.id);
        }
    }

    #[test]
    fn test_default_model_does_not_override_pinned() {
        let mut catalog = AssistantCatalog::defaults();
        let mut pinned = catalog.get(AI_SUMMARY).unwrap().clone();
        pinned.model = Some("gpt-4o-mini".to_string());
        catalog.insert(pinned);

        let catalog = catalog.with_default_model(Some("gpt-4o".to_string()));
        assert_eq!(catalog.get(AI_SUMMARY).unwrap().model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(catalog.get(VIRAL_HOOKS).unwrap().model.as_deref(), Some("gpt-4o"));
    }
}
