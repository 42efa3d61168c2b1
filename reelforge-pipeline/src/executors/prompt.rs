//! Text-generation stages.
//!
//! Each stage renders its assistant preset with values taken from earlier
//! stage outputs, sends one prompt and stores the reply under `text`.

use crate::error::{PipelineError, Result};
use crate::executor::{output_str, StageExecutor};
use async_trait::async_trait;
use reelforge_core::stages::*;
use reelforge_core::{Run, Stage};
use reelforge_llm::{AssistantCatalog, TextGenerator};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct PromptExecutor {
    generator: Arc<dyn TextGenerator>,
    assistants: AssistantCatalog,
    words_per_second: f64,
}

/// Spoken-word budget for a target duration: (minimum, target).
pub fn word_budget(target_duration: f64, words_per_second: f64) -> (usize, usize) {
    let target = (target_duration * words_per_second).floor().max(1.0) as usize;
    let min = target.saturating_sub(5).max((target as f64 * 0.85).floor() as usize);
    (min, target)
}

fn required_inputs(stage_id: &str) -> &'static [&'static str] {
    match stage_id {
        AI_TEXT_CLEANER | AI_SUMMARY => &["content"],
        VIRAL_HOOKS | SCRIPT_GENERATION | THUMBNAIL_CONCEPT => &["summary"],
        BACKGROUND_SELECTION | MUSIC_SOUND | AVATAR_BEHAVIOR => &["script"],
        _ => &[],
    }
}

/// Hooks come back one per line, sometimes numbered or quoted.
pub fn parse_hooks(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•'))
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```")
        .map(|rest| rest.split_once('\n').map_or("", |(_, body)| body))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

fn timeline_lines(run: &Run) -> Option<String> {
    let segments = run.completed_output(TIMELINE_CREATION)?.get("segments")?.as_array()?;
    let lines: Vec<String> = segments
        .iter()
        .filter_map(|s| {
            Some(format!(
                "[{:.1}s-{:.1}s] {}",
                s.get("start")?.as_f64()?,
                s.get("end")?.as_f64()?,
                s.get("text")?.as_str()?
            ))
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

impl PromptExecutor {
    pub fn new(generator: Arc<dyn TextGenerator>, assistants: AssistantCatalog, words_per_second: f64) -> Self {
        Self {
            generator,
            assistants,
            words_per_second,
        }
    }

    fn variables(&self, run: &Run) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        let (min_words, target_words) = word_budget(run.target_duration, self.words_per_second);
        vars.insert("target_duration", format!("{}", run.target_duration));
        vars.insert("target_words", target_words.to_string());
        vars.insert("min_words", min_words.to_string());

        let content = output_str(run, AI_TEXT_CLEANER, "text").or_else(|| output_str(run, WEB_SCRAPING, "content"));
        let hooks: Vec<String> = run
            .completed_output(VIRAL_HOOKS)
            .and_then(|o| o.get("hooks"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let optional = [
            ("content", content.map(str::to_string)),
            ("summary", output_str(run, AI_SUMMARY, "text").map(str::to_string)),
            ("hook", output_str(run, VIRAL_HOOKS, "selected").map(str::to_string)),
            ("hooks", (!hooks.is_empty()).then(|| hooks.join("\n"))),
            ("script", output_str(run, SCRIPT_GENERATION, "text").map(str::to_string)),
            ("timeline", timeline_lines(run)),
            ("background", output_str(run, BACKGROUND_SELECTION, "text").map(str::to_string)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                vars.insert(key, value);
            }
        }
        vars
    }
}

#[async_trait]
impl StageExecutor for PromptExecutor {
    async fn execute(&self, run: &Run, stage: &Stage) -> Result<Value> {
        let preset = self
            .assistants
            .get(&stage.id)
            .ok_or_else(|| PipelineError::MissingExecutor(format!("{} (no assistant preset)", stage.id)))?;

        let mut vars = self.variables(run);
        for input in required_inputs(&stage.id) {
            if !vars.contains_key(input) {
                return Err(PipelineError::MissingInput {
                    stage: stage.id.clone(),
                    input: input.to_string(),
                });
            }
        }
        for key in ["content", "summary", "hook", "hooks", "script", "timeline", "background"] {
            vars.entry(key).or_default();
        }

        let reply = self.generator.generate(preset.request(&vars)).await?;
        let text = strip_fences(&reply);
        if text.is_empty() {
            return Err(PipelineError::InvalidOutput(format!("{} returned no text", stage.id)));
        }
        info!(run_id = %run.id, stage_id = %stage.id, chars = text.len(), "Prompt stage answered");

        let output = match stage.id.as_str() {
            VIRAL_HOOKS => {
                let hooks = parse_hooks(&text);
                let selected = hooks
                    .first()
                    .cloned()
                    .ok_or_else(|| PipelineError::InvalidOutput("no hooks in reply".to_string()))?;
                json!({ "text": text, "hooks": hooks, "selected": selected })
            }
            SCRIPT_GENERATION => {
                let (min_words, target_words) = word_budget(run.target_duration, self.words_per_second);
                json!({
                    "text": text,
                    "word_count": text.split_whitespace().count(),
                    "target_words": target_words,
                    "min_words": min_words,
                })
            }
            _ => json!({ "text": text }),
        };
        Ok(output)
    }
}
