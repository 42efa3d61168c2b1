//! Narration text preparation.
//!
//! Generated scripts arrive with markup the synthesizer would read aloud:
//! bracketed stage directions, `*emphasis*` cues, speaker labels and markdown.
//! [`clean_narration`] strips all of it so only spoken words remain.

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    bracketed: Regex,
    strong: Regex,
    cue: Regex,
    speaker: Regex,
    heading: Regex,
    markdown: Regex,
    whitespace: Regex,
    space_before_punct: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        bracketed: Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}|<[^>]*>").unwrap(),
        strong: Regex::new(r"\*\*|__").unwrap(),
        cue: Regex::new(r"\*[^*]*\*").unwrap(),
        speaker: Regex::new(
            r"(?m)^[ \t]*(?:(?i:vo|v\.o\.|voice[- ]?over|narrator|host|speaker[ \t]*\d*)|[A-Z][A-Z0-9 ]{1,20})[ \t]*:[ \t]*",
        )
        .unwrap(),
        heading: Regex::new(r"(?m)^[ \t]*#{1,6}[ \t].*$").unwrap(),
        markdown: Regex::new(r"(?m)^[ \t]*(?:[-*+>]|\d+\.)[ \t]+|`+|^-{3,}$").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
        space_before_punct: Regex::new(r"\s+([,.!?;:])").unwrap(),
    })
}

/// Remove everything that is not meant to be spoken.
pub fn clean_narration(text: &str) -> String {
    let p = patterns();
    let text = p.heading.replace_all(text, "");
    let text = p.speaker.replace_all(&text, "");
    let text = p.markdown.replace_all(&text, "");
    let text = p.bracketed.replace_all(&text, " ");
    let text = p.strong.replace_all(&text, "");
    let text = p.cue.replace_all(&text, " ");
    // Unbalanced leftovers.
    let text: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | '*'))
        .collect();
    let text = p.whitespace.replace_all(&text, " ");
    let text = p.space_before_punct.replace_all(&text, "$1");
    text.trim().to_string()
}

/// True if the text still carries stage-direction markup.
pub fn has_direction_markers(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | '*'))
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep at most `max_words` whole words. A shortened text is closed with a
/// full stop so the voice does not end mid-phrase.
pub fn truncate_to_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut out = words[..max_words.max(1)].join(" ");
    while out.ends_with([',', ';', ':', '-']) {
        out.pop();
    }
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}
