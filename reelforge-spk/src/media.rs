//! Media transcoding collaborator.
//!
//! Intermediates are 16-bit PCM WAV so concatenation, trimming and padding
//! are lossless; only [`MediaToolkit::encode_mp3`] produces the delivery
//! format.

use crate::error::SpeechError;
use async_trait::async_trait;
use reelforge_core::config::SpeechConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Measured duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, SpeechError>;

    /// Join clips in order into one WAV file.
    async fn concat_to_wav(&self, inputs: &[PathBuf], output: &Path) -> Result<(), SpeechError>;

    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), SpeechError>;

    /// Cut to exactly `seconds`.
    async fn truncate(&self, input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError>;

    /// Append silence until the file lasts exactly `seconds`.
    async fn pad(&self, input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError>;

    async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), SpeechError>;
}

/// `MediaToolkit` backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: String,
    ffprobe: String,
    sample_rate: u32,
    bitrate: String,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            sample_rate: 44_100,
            bitrate: "128k".to_string(),
        }
    }

    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            sample_rate: config.sample_rate,
            bitrate: config.bitrate.clone(),
        }
    }

    /// True if both binaries answer `-version`.
    pub async fn is_available(&self) -> bool {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            let ok = Command::new(tool)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            if !ok {
                return false;
            }
        }
        true
    }

    async fn run_ffmpeg(&self, label: &str, args: &[String]) -> Result<(), SpeechError> {
        debug!(step = label, "ffmpeg {}", args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SpeechError::Media(format!("Failed to run {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.chars().take(500).collect();
            return Err(SpeechError::Media(format!(
                "ffmpeg {} failed ({}): {}",
                label,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn pcm_args(&self) -> Vec<String> {
        vec![
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
        ]
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn secs_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

/// Line for ffmpeg's concat demuxer. Single quotes are escaped the way the
/// demuxer expects.
fn concat_line(path: &Path) -> String {
    format!("file '{}'\n", path.to_string_lossy().replace('\'', r"'\''"))
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<f64, SpeechError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(path)
            .output()
            .await
            .map_err(|e| SpeechError::Media(format!("Failed to run {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Media(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| SpeechError::Media(format!("Unreadable ffprobe output: {}", e)))?;
        let duration = parsed
            .format
            .duration
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| SpeechError::Media(format!("No duration for {}", path.display())))?;
        Ok(duration)
    }

    async fn concat_to_wav(&self, inputs: &[PathBuf], output: &Path) -> Result<(), SpeechError> {
        if inputs.is_empty() {
            return Err(SpeechError::InvalidSegments("Nothing to concatenate".to_string()));
        }
        let list_path = output.with_extension("concat.txt");
        let list: String = inputs.iter().map(|p| concat_line(p)).collect();
        tokio::fs::write(&list_path, list).await?;

        let mut args = vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            path_arg(&list_path),
        ];
        args.extend(self.pcm_args());
        args.push(path_arg(output));

        let result = self.run_ffmpeg("concat", &args).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }

    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
        let mut args = vec!["-i".to_string(), path_arg(input)];
        args.extend(self.pcm_args());
        args.push(path_arg(output));
        self.run_ffmpeg("to_wav", &args).await
    }

    async fn truncate(&self, input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError> {
        let mut args = vec![
            "-i".to_string(),
            path_arg(input),
            "-t".to_string(),
            secs_arg(seconds),
        ];
        args.extend(self.pcm_args());
        args.push(path_arg(output));
        self.run_ffmpeg("truncate", &args).await
    }

    async fn pad(&self, input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError> {
        let mut args = vec![
            "-i".to_string(),
            path_arg(input),
            "-af".to_string(),
            format!("apad=whole_dur={}", secs_arg(seconds)),
            "-t".to_string(),
            secs_arg(seconds),
        ];
        args.extend(self.pcm_args());
        args.push(path_arg(output));
        self.run_ffmpeg("pad", &args).await
    }

    async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
        let args = vec![
            "-i".to_string(),
            path_arg(input),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            path_arg(output),
        ];
        self.run_ffmpeg("encode_mp3", &args).await
    }
}
