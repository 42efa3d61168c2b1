//! Duration-constrained voice assembly.
//!
//! Turns ordered narration segments into one mp3 whose measured length
//! matches the target. Segments are synthesized strictly one after another:
//! the rate for segment i+1 depends on the measured length of segment i.

use crate::calibration::{initial_multiplier, RateController};
use crate::config::{AssemblerConfig, VoiceRequest};
use crate::engines::TtsEngine;
use crate::error::{Result, SpeechError};
use crate::media::MediaToolkit;
use crate::text::{clean_narration, has_direction_markers, truncate_to_words, word_count};
use reelforge_core::VoiceSegment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One slice of the script with its share of the target duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSegment {
    pub id: String,
    pub text: String,
    /// Allotted seconds.
    pub allotted: f64,
}

impl NarrationSegment {
    pub fn new(id: impl Into<String>, text: impl Into<String>, allotted: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            allotted,
        }
    }
}

/// What the final reconciliation did to the merged track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    Truncated,
    Padded,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub run_id: String,
    pub voice_id: String,
    pub target: f64,
    pub segments: Vec<NarrationSegment>,
    /// Published clips and the merged track land here.
    pub output_dir: PathBuf,
    /// Scratch space for WAV intermediates.
    pub work_dir: PathBuf,
    /// URL prefix under which `output_dir` is served, e.g. `/uploads/`.
    pub url_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyResult {
    pub segments: Vec<VoiceSegment>,
    pub merged_path: String,
    pub merged_url: String,
    /// Measured duration of the delivered file.
    pub final_duration: f64,
    /// Measured duration of the concatenation before reconciliation.
    pub raw_duration: f64,
    pub target: f64,
    pub initial_multiplier: f64,
    pub final_multiplier: f64,
    pub reconciliation: Reconciliation,
}

struct Clip {
    id: String,
    text: String,
    path: PathBuf,
    duration: f64,
    rate: f64,
}

pub struct VoiceAssembler {
    engine: Arc<dyn TtsEngine>,
    media: Arc<dyn MediaToolkit>,
    config: AssemblerConfig,
}

impl VoiceAssembler {
    pub fn new(engine: Arc<dyn TtsEngine>, media: Arc<dyn MediaToolkit>, config: AssemblerConfig) -> Self {
        Self { engine, media, config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn TtsEngine> {
        &self.engine
    }

    /// Synthesize, join and reconcile. On failure every clip and
    /// intermediate written so far is removed.
    pub async fn assemble(&self, job: AssemblyJob) -> Result<AssemblyResult> {
        self.validate(&job)?;
        tokio::fs::create_dir_all(&job.output_dir).await?;
        tokio::fs::create_dir_all(&job.work_dir).await?;

        let mut written = Vec::new();
        match self.assemble_into(&job, &mut written).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(run_id = %job.run_id, files = written.len(), error = %e, "Assembly failed; removing partial output");
                cleanup(&written).await;
                Err(e)
            }
        }
    }

    async fn assemble_into(&self, job: &AssemblyJob, written: &mut Vec<PathBuf>) -> Result<AssemblyResult> {
        let cleaned = self.clean_segments(&job.segments)?;
        let total_words: usize = cleaned.iter().map(|t| word_count(t)).sum();
        let estimated = total_words as f64 / self.config.words_per_second;
        let initial = initial_multiplier(estimated, job.target);
        let range = self.engine.rate_range();
        info!(
            run_id = %job.run_id,
            segments = job.segments.len(),
            target = job.target,
            estimated,
            multiplier = initial,
            engine = self.engine.name(),
            "Assembling voice"
        );

        let allotted: Vec<f64> = job.segments.iter().map(|s| s.allotted).collect();
        let mut controller = RateController::new(initial, job.target, allotted);
        let mut clips: Vec<Clip> = Vec::with_capacity(job.segments.len());

        for (index, (segment, text)) in job.segments.iter().zip(cleaned).enumerate() {
            let wanted = controller.current();
            let rate = wanted.clamp(*range.start(), *range.end());
            if rate != wanted {
                debug!(run_id = %job.run_id, segment = index, wanted, applied = rate, "Rate clamped to engine range");
            }
            let text = self.fit_to_allotment(&text, segment.allotted, rate, index);
            let voice = VoiceRequest::new(job.voice_id.clone(), rate);
            let audio = self.engine.synthesize(&text, &voice).await?;
            if audio.is_empty() {
                warn!(run_id = %job.run_id, segment = index, "Engine returned no audio");
                return Err(SpeechError::SegmentCountMismatch {
                    expected: job.segments.len(),
                    actual: clips.len(),
                });
            }

            let path = job.output_dir.join(format!("voice_{}_{}.mp3", job.run_id, segment.id));
            written.push(path.clone());
            tokio::fs::write(&path, &audio).await?;
            let duration = self.media.probe_duration(&path).await?;
            let next = controller.record(duration);
            debug!(
                run_id = %job.run_id,
                segment = index,
                duration,
                allotted = segment.allotted,
                spent = controller.spent(),
                next_multiplier = next,
                "Segment synthesized"
            );

            clips.push(Clip {
                id: segment.id.clone(),
                text,
                path,
                duration,
                rate,
            });
        }

        let stem = format!("voice_{}", job.run_id);
        let joined = job.work_dir.join(format!("{}_joined.wav", stem));
        written.push(joined.clone());
        if clips.len() == 1 {
            self.media.to_wav(&clips[0].path, &joined).await?;
        } else {
            let inputs: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
            self.media.concat_to_wav(&inputs, &joined).await?;
        }
        let raw_duration = self.media.probe_duration(&joined).await?;

        let fitted = job.work_dir.join(format!("{}_fitted.wav", stem));
        written.push(fitted.clone());
        let (source, reconciliation) = self.reconcile(&joined, &fitted, raw_duration, job.target).await?;

        let merged_name = format!("{}.mp3", stem);
        let merged = job.output_dir.join(&merged_name);
        written.push(merged.clone());
        self.media.encode_mp3(&source, &merged).await?;
        let final_duration = self.media.probe_duration(&merged).await?;

        cleanup(&[joined, fitted]).await;

        info!(
            run_id = %job.run_id,
            raw_duration,
            final_duration,
            target = job.target,
            reconciliation = ?reconciliation,
            "Voice assembled"
        );

        let first_rate = clips.first().map(|c| c.rate).unwrap_or(initial);
        Ok(AssemblyResult {
            segments: place_segments(&clips, final_duration, &job.url_prefix),
            merged_path: merged.to_string_lossy().into_owned(),
            merged_url: format!("{}{}", job.url_prefix, merged_name),
            final_duration,
            raw_duration,
            target: job.target,
            initial_multiplier: first_rate,
            final_multiplier: clips.last().map(|c| c.rate).unwrap_or(first_rate),
            reconciliation,
        })
    }

    fn validate(&self, job: &AssemblyJob) -> Result<()> {
        if job.voice_id.trim().is_empty() {
            return Err(SpeechError::MissingVoice);
        }
        if job.segments.is_empty() {
            return Err(SpeechError::InvalidSegments("No segments".to_string()));
        }
        if !(job.target.is_finite() && job.target > 0.0) {
            return Err(SpeechError::InvalidSegments(format!("Invalid target {}", job.target)));
        }
        if let Some(bad) = job
            .segments
            .iter()
            .find(|s| !(s.allotted.is_finite() && s.allotted > 0.0))
        {
            return Err(SpeechError::InvalidSegments(format!(
                "Segment {} has allotted duration {}",
                bad.id, bad.allotted
            )));
        }
        let total: f64 = job.segments.iter().map(|s| s.allotted).sum();
        if (total - job.target).abs() > job.target * 0.01 + 0.05 {
            return Err(SpeechError::InvalidSegments(format!(
                "Allotted durations sum to {:.2}s, target is {:.2}s",
                total, job.target
            )));
        }
        Ok(())
    }

    fn clean_segments(&self, segments: &[NarrationSegment]) -> Result<Vec<String>> {
        segments
            .iter()
            .map(|segment| {
                let text = clean_narration(&segment.text);
                if text.chars().count() < self.config.min_text_chars || has_direction_markers(&text) {
                    return Err(SpeechError::EmptyText {
                        segment: segment.id.clone(),
                    });
                }
                Ok(text)
            })
            .collect()
    }

    /// Shorten text whose estimated duration overruns its allotment.
    fn fit_to_allotment(&self, text: &str, allotted: f64, rate: f64, index: usize) -> String {
        let words = word_count(text);
        let pace = self.config.words_per_second * rate;
        let estimate = words as f64 / pace;
        if estimate <= allotted * self.config.overrun_ratio {
            return text.to_string();
        }
        let max_words = ((allotted * self.config.truncate_ratio * pace).floor() as usize).max(1);
        debug!(segment = index, words, max_words, estimate, allotted, "Truncating segment text");
        truncate_to_words(text, max_words)
    }

    /// Force the joined track onto the target. Returns the file to encode.
    async fn reconcile(
        &self,
        joined: &Path,
        fitted: &Path,
        measured: f64,
        target: f64,
    ) -> Result<(PathBuf, Reconciliation)> {
        if measured - target > self.config.truncate_tolerance_secs {
            self.media.truncate(joined, fitted, target).await?;
            Ok((fitted.to_path_buf(), Reconciliation::Truncated))
        } else if target - measured > self.config.pad_tolerance_secs {
            self.media.pad(joined, fitted, target).await?;
            Ok((fitted.to_path_buf(), Reconciliation::Padded))
        } else {
            Ok((joined.to_path_buf(), Reconciliation::Unchanged))
        }
    }
}

/// Lay clips end to end using their measured durations, clamped to the
/// delivered track.
fn place_segments(clips: &[Clip], final_duration: f64, url_prefix: &str) -> Vec<VoiceSegment> {
    let mut cursor = 0.0_f64;
    clips
        .iter()
        .map(|clip| {
            let start = cursor.min(final_duration);
            let end = (cursor + clip.duration).min(final_duration);
            cursor += clip.duration;
            let file = clip
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            VoiceSegment {
                id: clip.id.clone(),
                text: clip.text.clone(),
                audio_path: format!("{}{}", url_prefix, file),
                start: round_ms(start),
                end: round_ms(end),
                duration: round_ms(clip.duration),
                speaking_rate: clip.rate,
            }
        })
        .collect()
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

async fn cleanup(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Could not remove intermediate");
            }
        }
    }
}
