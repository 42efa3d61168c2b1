//! Voice assembler tests with a scripted engine and a file-backed fake
//! media toolkit. Fake clips store their duration as text.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reelforge_spk::*;
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct ScriptedEngine {
    durations: Mutex<VecDeque<f64>>,
    drop_call: Option<usize>,
    calls: Mutex<Vec<(String, f64)>>,
    range: RangeInclusive<f64>,
}

impl ScriptedEngine {
    fn new(durations: &[f64]) -> Arc<Self> {
        Self::dropping(durations, None)
    }

    fn dropping(durations: &[f64], drop_call: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            durations: Mutex::new(durations.iter().copied().collect()),
            drop_call,
            calls: Mutex::new(Vec::new()),
            range: 0.85..=1.8,
        })
    }

    fn limited(durations: &[f64], range: RangeInclusive<f64>) -> Arc<Self> {
        Arc::new(Self {
            durations: Mutex::new(durations.iter().copied().collect()),
            drop_call: None,
            calls: Mutex::new(Vec::new()),
            range,
        })
    }

    fn texts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    fn rates(&self) -> Vec<f64> {
        self.calls.lock().iter().map(|(_, r)| *r).collect()
    }
}

#[async_trait]
impl TtsEngine for ScriptedEngine {
    async fn synthesize(&self, text: &str, voice: &VoiceRequest) -> Result<Bytes, SpeechError> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push((text.to_string(), voice.speaking_rate));
            calls.len() - 1
        };
        let duration = self
            .durations
            .lock()
            .pop_front()
            .ok_or_else(|| SpeechError::Api("script exhausted".to_string()))?;
        if self.drop_call == Some(index) {
            return Ok(Bytes::new());
        }
        Ok(Bytes::from(duration.to_string()))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        Ok(vec![])
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn rate_range(&self) -> RangeInclusive<f64> {
        self.range.clone()
    }
}

#[derive(Default)]
struct FakeMedia {
    ops: Mutex<Vec<String>>,
}

impl FakeMedia {
    fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    fn log(&self, op: &str) {
        self.ops.lock().push(op.to_string());
    }
}

async fn read_secs(path: &Path) -> Result<f64, SpeechError> {
    let raw = tokio::fs::read_to_string(path).await?;
    raw.trim()
        .parse()
        .map_err(|_| SpeechError::Media(format!("bad fake clip {}", path.display())))
}

async fn write_secs(path: &Path, secs: f64) -> Result<(), SpeechError> {
    tokio::fs::write(path, secs.to_string()).await?;
    Ok(())
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn probe_duration(&self, path: &Path) -> Result<f64, SpeechError> {
        read_secs(path).await
    }

    async fn concat_to_wav(&self, inputs: &[PathBuf], output: &Path) -> Result<(), SpeechError> {
        self.log("concat");
        let mut total = 0.0;
        for input in inputs {
            total += read_secs(input).await?;
        }
        write_secs(output, total).await
    }

    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
        self.log("to_wav");
        write_secs(output, read_secs(input).await?).await
    }

    async fn truncate(&self, _input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError> {
        self.log("truncate");
        write_secs(output, seconds).await
    }

    async fn pad(&self, _input: &Path, output: &Path, seconds: f64) -> Result<(), SpeechError> {
        self.log("pad");
        write_secs(output, seconds).await
    }

    async fn encode_mp3(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
        self.log("encode_mp3");
        write_secs(output, read_secs(input).await?).await
    }
}

const ELEVEN_WORDS: &str = "Meet the mug that keeps your coffee hot for hours on end.";

fn job(dir: &TempDir, target: f64, segments: Vec<NarrationSegment>) -> AssemblyJob {
    AssemblyJob {
        run_id: "run-1".to_string(),
        voice_id: "voice-1".to_string(),
        target,
        segments,
        output_dir: dir.path().join("uploads"),
        work_dir: dir.path().join("work"),
        url_prefix: "/uploads/".to_string(),
    }
}

fn three_segments() -> Vec<NarrationSegment> {
    (1..=3)
        .map(|i| NarrationSegment::new(format!("segment_{}", i), ELEVEN_WORDS, 5.0))
        .collect()
}

/// Files left behind in a directory; a missing directory counts as empty.
fn leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn assembler(engine: Arc<ScriptedEngine>, media: Arc<FakeMedia>) -> VoiceAssembler {
    VoiceAssembler::new(engine, media, AssemblerConfig::default())
}

#[tokio::test]
async fn test_overrun_is_truncated_to_target() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[6.2, 4.8, 5.5]);
    let media = Arc::new(FakeMedia::default());

    let result = assembler(engine.clone(), media.clone())
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap();

    assert_eq!(result.reconciliation, Reconciliation::Truncated);
    assert!((result.raw_duration - 16.5).abs() < 1e-9);
    assert!((result.final_duration - 15.0).abs() <= 0.3);
    assert_eq!(result.merged_url, "/uploads/voice_run-1.mp3");
    assert_eq!(media.ops(), vec!["concat", "truncate", "encode_mp3"]);

    let offsets: Vec<(f64, f64)> = result.segments.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(offsets, vec![(0.0, 6.2), (6.2, 11.0), (11.0, 15.0)]);
    assert_eq!(result.segments[2].duration, 5.5);
    assert_eq!(result.segments[0].audio_path, "/uploads/voice_run-1_segment_1.mp3");
    assert_eq!(engine.rates(), vec![1.0, 1.0, 1.0]);
}

#[tokio::test]
async fn test_missing_clip_is_fatal() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::dropping(&[5.0, 5.0, 5.0], Some(1));
    let media = Arc::new(FakeMedia::default());

    let err = assembler(engine.clone(), media.clone())
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SpeechError::SegmentCountMismatch { expected: 3, actual: 1 }
    ));
    assert!(err.is_fatal());
    assert_eq!(engine.rates().len(), 2);
    assert!(media.ops().is_empty());
    assert!(leftovers(&dir.path().join("uploads")).is_empty());
    assert!(leftovers(&dir.path().join("work")).is_empty());
}

#[tokio::test]
async fn test_single_short_segment_is_padded_not_sped_up() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[7.0]);
    let media = Arc::new(FakeMedia::default());
    let text = "Stop scrolling. This little mug keeps every sip at the perfect temperature all day long.";

    let result = assembler(engine.clone(), media.clone())
        .assemble(job(&dir, 10.0, vec![NarrationSegment::new("segment_1", text, 10.0)]))
        .await
        .unwrap();

    assert_eq!(result.reconciliation, Reconciliation::Padded);
    assert!((result.final_duration - 10.0).abs() <= 0.5);
    assert_eq!(media.ops(), vec!["to_wav", "pad", "encode_mp3"]);
    assert_eq!(result.segments[0].end, 7.0);
    assert_eq!(engine.rates().len(), 1);
}

#[tokio::test]
async fn test_small_deviation_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[5.1, 5.0, 5.1]);
    let media = Arc::new(FakeMedia::default());

    let result = assembler(engine, media.clone())
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap();

    assert_eq!(result.reconciliation, Reconciliation::Unchanged);
    assert_eq!(media.ops(), vec!["concat", "encode_mp3"]);
    assert!((result.final_duration - 15.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_rate_escalates_after_long_first_clip() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[10.5, 2.0, 2.5]);
    let media = Arc::new(FakeMedia::default());

    let result = assembler(engine.clone(), media)
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap();

    let rates = engine.rates();
    assert_eq!(rates[0], 1.0);
    assert!((rates[1] - 1.2).abs() < 1e-9);
    assert!((rates[2] - 1.2).abs() < 1e-9);
    assert!((result.final_multiplier - 1.2).abs() < 1e-9);
    assert_eq!(result.initial_multiplier, 1.0);
}

#[tokio::test]
async fn test_reported_rates_stay_inside_engine_range() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::limited(&[10.5, 2.0, 2.5], 0.9..=1.1);
    let media = Arc::new(FakeMedia::default());

    let result = assembler(engine.clone(), media)
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap();

    let rates = engine.rates();
    assert_eq!(rates[0], 1.0);
    assert_eq!(&rates[1..], &[1.1, 1.1]);
    for segment in &result.segments {
        assert!(segment.speaking_rate <= 1.1, "{} reported {}", segment.id, segment.speaking_rate);
    }
    assert_eq!(result.segments[1].speaking_rate, 1.1);
    assert_eq!(result.final_multiplier, 1.1);
    assert_eq!(result.initial_multiplier, 1.0);
}

#[tokio::test]
async fn test_overlong_text_is_cut_before_synthesis() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[3.0]);
    let media = Arc::new(FakeMedia::default());
    let long = "word ".repeat(30);

    assembler(engine.clone(), media)
        .assemble(job(&dir, 3.0, vec![NarrationSegment::new("segment_1", long, 3.0)]))
        .await
        .unwrap();

    // 30 words for 3s starts at 1.25x; budget is floor(3 * 1.15 * 2.3 * 1.25) = 9 words.
    let sent = engine.texts();
    assert_eq!(sent[0].split_whitespace().count(), 9);
    assert!(sent[0].ends_with('.'));
}

#[tokio::test]
async fn test_directions_never_reach_engine() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[5.0, 5.0, 5.0]);
    let media = Arc::new(FakeMedia::default());
    let mut segments = three_segments();
    segments[0].text = format!("[Upbeat music] {} (smiles)", ELEVEN_WORDS);

    assembler(engine.clone(), media)
        .assemble(job(&dir, 15.0, segments))
        .await
        .unwrap();

    assert_eq!(engine.texts()[0], ELEVEN_WORDS);
}

#[tokio::test]
async fn test_empty_cleaned_text_fails_before_synthesis() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[5.0, 5.0, 5.0]);
    let media = Arc::new(FakeMedia::default());
    let mut segments = three_segments();
    segments[1].text = "[music swells]".to_string();

    let err = assembler(engine.clone(), media)
        .assemble(job(&dir, 15.0, segments))
        .await
        .unwrap_err();

    match err {
        SpeechError::EmptyText { segment } => assert_eq!(segment, "segment_2"),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(engine.texts().is_empty());
}

#[tokio::test]
async fn test_contract_violations() {
    let dir = TempDir::new().unwrap();
    let media = Arc::new(FakeMedia::default());

    let mut no_voice = job(&dir, 15.0, three_segments());
    no_voice.voice_id = String::new();
    let err = assembler(ScriptedEngine::new(&[]), media.clone())
        .assemble(no_voice)
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::MissingVoice));

    let err = assembler(ScriptedEngine::new(&[]), media.clone())
        .assemble(job(&dir, 20.0, three_segments()))
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::InvalidSegments(_)));

    let err = assembler(ScriptedEngine::new(&[]), media)
        .assemble(job(&dir, 15.0, vec![]))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_engine_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(&[5.0]);
    let media = Arc::new(FakeMedia::default());

    let err = assembler(engine, media)
        .assemble(job(&dir, 15.0, three_segments()))
        .await
        .unwrap_err();
    assert!(matches!(err, SpeechError::Api(_)));
    assert!(!err.is_fatal());
    // The first clip was written before the engine failed.
    assert!(leftovers(&dir.path().join("uploads")).is_empty());
}
