//! reelforge-spk: narration synthesis
//!
//! Provides:
//! - TTS engines (ElevenLabs, OpenAI) behind the `TtsEngine` trait
//! - An ffmpeg-backed `MediaToolkit` for probing, joining and fitting audio
//! - Narration cleaning and speaking-rate calibration
//! - `VoiceAssembler`, which fits synthesized speech to a target duration

pub mod error;
pub mod config;
pub mod engines;
pub mod text;
pub mod calibration;
pub mod media;
pub mod assembler;

pub use error::SpeechError;
pub use config::{AssemblerConfig, VoiceRequest, VoiceSettings};
pub use engines::{build_engine, TtsEngine, VoiceInfo};
pub use media::{FfmpegToolkit, MediaToolkit};
pub use assembler::{
    AssemblyJob, AssemblyResult, NarrationSegment, Reconciliation, VoiceAssembler,
};
