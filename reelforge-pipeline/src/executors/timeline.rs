use crate::error::{PipelineError, Result};
use crate::executor::{output_str, StageExecutor};
use crate::timeline::{create_timeline, to_srt, to_vtt};
use async_trait::async_trait;
use reelforge_core::stages::SCRIPT_GENERATION;
use reelforge_core::{Error, Run, Stage};
use serde_json::Value;
use tracing::info;

/// Splits the script into timed segments. Deterministic, no collaborator.
pub struct TimelineExecutor {
    segments: usize,
}

impl TimelineExecutor {
    pub fn new(segments: usize) -> Self {
        Self {
            segments: segments.max(1),
        }
    }
}

#[async_trait]
impl StageExecutor for TimelineExecutor {
    async fn execute(&self, run: &Run, stage: &Stage) -> Result<Value> {
        let script = output_str(run, SCRIPT_GENERATION, "text").ok_or_else(|| PipelineError::MissingInput {
            stage: stage.id.clone(),
            input: "script".to_string(),
        })?;

        let timeline = create_timeline(script, run.target_duration, self.segments)?;
        info!(run_id = %run.id, segments = timeline.segments.len(), "Timeline created");

        let mut output = serde_json::to_value(&timeline).map_err(Error::from)?;
        if let Value::Object(map) = &mut output {
            map.insert("srt".to_string(), Value::String(to_srt(&timeline)));
            map.insert("vtt".to_string(), Value::String(to_vtt(&timeline)));
        }
        Ok(output)
    }
}
