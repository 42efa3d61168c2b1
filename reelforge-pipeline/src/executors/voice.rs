//! Voice generation stage: timeline segments through the voice assembler.

use crate::error::{PipelineError, Result};
use crate::executor::{output_str, StageExecutor};
use async_trait::async_trait;
use reelforge_core::config::PipelineConfig;
use reelforge_core::stages::{SCRIPT_GENERATION, TIMELINE_CREATION};
use reelforge_core::{Error, Run, Stage};
use reelforge_spk::{AssemblyJob, NarrationSegment, SpeechError, VoiceAssembler};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub struct VoiceExecutor {
    assembler: Arc<VoiceAssembler>,
    voice_id: Option<String>,
    output_dir: PathBuf,
    work_dir: PathBuf,
    url_prefix: String,
}

impl VoiceExecutor {
    pub fn new(assembler: Arc<VoiceAssembler>, voice_id: Option<String>, config: &PipelineConfig) -> Self {
        let mut url_prefix = config.asset_prefix.clone();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }
        Self {
            assembler,
            voice_id: voice_id.filter(|v| !v.trim().is_empty()),
            output_dir: PathBuf::from(&config.output_dir),
            work_dir: PathBuf::from(&config.work_dir),
            url_prefix,
        }
    }
}

/// Timeline segments when the timeline stage completed, else the whole
/// script as one segment.
pub fn narration_segments(run: &Run) -> Result<Vec<NarrationSegment>> {
    if let Some(segments) = run
        .completed_output(TIMELINE_CREATION)
        .and_then(|o| o.get("segments"))
        .and_then(Value::as_array)
    {
        return segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let text = s.get("text").and_then(Value::as_str);
                let duration = s.get("duration").and_then(Value::as_f64);
                match (text, duration) {
                    (Some(text), Some(duration)) => {
                        let id = s
                            .get("id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("segment_{}", i + 1));
                        Ok(NarrationSegment::new(id, text, duration))
                    }
                    _ => Err(PipelineError::Speech(SpeechError::InvalidSegments(format!(
                        "timeline segment {} lacks text or duration",
                        i + 1
                    )))),
                }
            })
            .collect();
    }

    let script = output_str(run, SCRIPT_GENERATION, "text").ok_or_else(|| PipelineError::MissingInput {
        stage: reelforge_core::stages::VOICE_GENERATION.to_string(),
        input: "timeline or script".to_string(),
    })?;
    Ok(vec![NarrationSegment::new("segment_1", script, run.target_duration)])
}

#[async_trait]
impl StageExecutor for VoiceExecutor {
    async fn execute(&self, run: &Run, _stage: &Stage) -> Result<Value> {
        let voice_id = self
            .voice_id
            .clone()
            .ok_or(PipelineError::Speech(SpeechError::MissingVoice))?;
        let segments = narration_segments(run)?;

        let job = AssemblyJob {
            run_id: run.id.clone(),
            voice_id,
            target: run.target_duration,
            segments,
            output_dir: self.output_dir.clone(),
            work_dir: self.work_dir.join(&run.id),
            url_prefix: self.url_prefix.clone(),
        };
        let result = self.assembler.assemble(job).await?;
        Ok(serde_json::to_value(result).map_err(Error::from)?)
    }
}
