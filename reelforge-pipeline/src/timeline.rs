//! Timeline segmentation and subtitle export.
//!
//! The script is split into sentences, sentences are grouped into at most
//! `segment_count` segments, and each segment gets a share of the target
//! proportional to its word count. Shares always sum to the target exactly.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub id: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub segments: Vec<TimelineSegment>,
    pub total_duration: f64,
    pub total_words: usize,
    pub words_per_second: f64,
}

fn sentences(script: &str) -> Vec<&str> {
    script
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn create_timeline(script: &str, target: f64, segment_count: usize) -> Result<Timeline> {
    if script.trim().is_empty() {
        return Err(PipelineError::Contract("script is empty".to_string()));
    }
    if !(target.is_finite() && target > 0.0) {
        return Err(PipelineError::Contract(format!("invalid target duration {}", target)));
    }
    let segment_count = segment_count.max(1);
    let sentences = sentences(script);
    if sentences.is_empty() {
        return Err(PipelineError::Contract("script has no sentences".to_string()));
    }

    let total_words = script.split_whitespace().count();
    let per_segment = sentences.len().div_ceil(segment_count);

    let grouped: Vec<(String, usize)> = sentences
        .chunks(per_segment)
        .map(|chunk| {
            let text = format!("{}.", chunk.join(". "));
            let words = text.split_whitespace().count();
            (text, words)
        })
        .collect();
    let grouped_words: usize = grouped.iter().map(|(_, w)| *w).sum();

    let mut segments = Vec::with_capacity(grouped.len());
    let mut cursor = 0.0;
    let last = grouped.len() - 1;
    for (i, (text, word_count)) in grouped.into_iter().enumerate() {
        let share = word_count as f64 / grouped_words.max(1) as f64;
        let end = if i == last { target } else { cursor + share * target };
        segments.push(TimelineSegment {
            id: format!("segment_{}", i + 1),
            text,
            start: cursor,
            end,
            duration: end - cursor,
            word_count,
        });
        cursor = end;
    }

    Ok(Timeline {
        segments,
        total_duration: target,
        total_words,
        words_per_second: total_words as f64 / target,
    })
}

/// Segments are non-empty, ordered and non-overlapping.
pub fn validate_timeline(timeline: &Timeline) -> bool {
    !timeline.segments.is_empty()
        && timeline
            .segments
            .iter()
            .all(|s| s.start >= 0.0 && s.end > s.start)
        && timeline
            .segments
            .windows(2)
            .all(|w| w[1].start >= w[0].end - 1e-9)
}

fn millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn srt_time(seconds: f64) -> String {
    let ms = millis(seconds);
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

fn vtt_time(seconds: f64) -> String {
    let ms = millis(seconds);
    format!("{:02}:{:02}.{:03}", ms / 60_000, (ms / 1000) % 60, ms % 1000)
}

pub fn to_srt(timeline: &Timeline) -> String {
    timeline
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}\n{} --> {}\n{}\n", i + 1, srt_time(s.start), srt_time(s.end), s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_vtt(timeline: &Timeline) -> String {
    let cues = timeline
        .segments
        .iter()
        .map(|s| format!("{} --> {}\n{}", vtt_time(s.start), vtt_time(s.end), s.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("WEBVTT\n\n{}\n", cues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SCRIPT: &str = "Stop scrolling. This mug keeps coffee hot for hours! Charge it on the coaster. \
                          Control it from your phone. Order yours today?";

    #[test]
    fn test_five_sentences_five_segments() {
        let timeline = create_timeline(SCRIPT, 15.0, 5).unwrap();
        assert_eq!(timeline.segments.len(), 5);
        assert_eq!(timeline.segments[0].id, "segment_1");
        assert_eq!(timeline.segments[0].text, "Stop scrolling.");
        assert_eq!(timeline.segments[4].end, 15.0);
        assert!(validate_timeline(&timeline));
        // Longer sentences get more time.
        assert!(timeline.segments[1].duration > timeline.segments[0].duration);
    }

    #[test]
    fn test_sentences_are_grouped() {
        let timeline = create_timeline(SCRIPT, 10.0, 2).unwrap();
        assert_eq!(timeline.segments.len(), 2);
        assert_eq!(
            timeline.segments[0].text,
            "Stop scrolling. This mug keeps coffee hot for hours. Charge it on the coaster."
        );
    }

    #[test]
    fn test_fewer_sentences_than_segments() {
        let timeline = create_timeline("Just one line", 8.0, 5).unwrap();
        assert_eq!(timeline.segments.len(), 1);
        assert_eq!(timeline.segments[0].duration, 8.0);
    }

    #[test]
    fn test_empty_script_is_contract_error() {
        assert!(matches!(create_timeline("  ", 10.0, 5), Err(PipelineError::Contract(_))));
        assert!(matches!(create_timeline("...", 10.0, 5), Err(PipelineError::Contract(_))));
    }

    #[test]
    fn test_srt_and_vtt() {
        let timeline = create_timeline("One two. Three four five six", 3661.5, 2).unwrap();
        let srt = to_srt(&timeline);
        assert!(srt.starts_with("1\n00:00:00,000 --> "));
        assert!(srt.contains("--> 01:01:01,500\nThree four five six.\n"));

        let vtt = to_vtt(&create_timeline("Hello there", 12.25, 1).unwrap());
        assert_eq!(vtt, "WEBVTT\n\n00:00.000 --> 00:12.250\nHello there.\n");
    }

    proptest! {
        #[test]
        fn prop_durations_sum_to_target(
            sentences in prop::collection::vec("[a-z]{1,6}( [a-z]{1,6}){0,8}", 1..15),
            target in 3.0f64..60.0,
            count in 1usize..8,
        ) {
            let script = sentences.join(". ");
            let timeline = create_timeline(&script, target, count).unwrap();
            let sum: f64 = timeline.segments.iter().map(|s| s.duration).sum();
            prop_assert!((sum - target).abs() < 1e-6);
            prop_assert!(timeline.segments.len() <= count);
            prop_assert_eq!(timeline.segments.last().unwrap().end, target);
            prop_assert!(validate_timeline(&timeline));
        }
    }
}
