//! Page content source.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const MAX_CONTENT_CHARS: usize = 20_000;

/// Normalized text of a web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub word_count: usize,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent>;
}

/// Fetches a page over HTTP and strips markup.
pub struct HttpContentSource {
    client: Client,
}

impl HttpContentSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reelforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PipelineError::Contract(format!("unsupported URL: {}", url)));
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch(format!("{} returned {}", url, status)));
        }
        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;
        debug!(url, bytes = html.len(), "Page fetched");

        let page = extract_page(url, &html);
        if page.content.is_empty() {
            return Err(PipelineError::InvalidOutput(format!("no readable text at {}", url)));
        }
        Ok(page)
    }
}

struct Patterns {
    title: Regex,
    description: Regex,
    invisible: Regex,
    block: Regex,
    tag: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap(),
        description: Regex::new(
            r#"(?is)<meta[^>]+(?:name|property)=["'](?:og:)?description["'][^>]*content=["']([^"']*)["']"#,
        )
        .unwrap(),
        invisible: Regex::new(
            r"(?is)<(script|style|noscript|svg|head|nav|footer|iframe)\b.*?</(script|style|noscript|svg|head|nav|footer|iframe)>|<!--.*?-->",
        )
        .unwrap(),
        block: Regex::new(r"(?i)</?(p|div|li|h[1-6]|br|section|article|tr)\b[^>]*>").unwrap(),
        tag: Regex::new(r"<[^>]*>").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn normalize(text: &str) -> String {
    patterns()
        .whitespace
        .replace_all(&decode_entities(text), " ")
        .trim()
        .to_string()
}

/// Title, description and visible text of an HTML document.
pub fn extract_page(url: &str, html: &str) -> PageContent {
    let p = patterns();
    let title = p
        .title
        .captures(html)
        .map(|c| normalize(&c[1]))
        .unwrap_or_default();
    let description = p
        .description
        .captures(html)
        .map(|c| normalize(&c[1]))
        .unwrap_or_default();

    let body = p.invisible.replace_all(html, " ");
    let body = p.block.replace_all(&body, ". ");
    let body = p.tag.replace_all(&body, " ");
    let mut content = normalize(&body);
    content = collapse_separators(&content);
    if content.chars().count() > MAX_CONTENT_CHARS {
        content = content.chars().take(MAX_CONTENT_CHARS).collect();
    }

    let word_count = content.split_whitespace().count();
    PageContent {
        url: url.to_string(),
        title,
        description,
        content,
        word_count,
    }
}

/// Drop the empty ". " runs left behind by adjacent block tags.
fn collapse_separators(text: &str) -> String {
    let mut pieces: Vec<&str> = Vec::new();
    for piece in text.split(". ") {
        let piece = piece.trim().trim_matches('.').trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces.join(". ")
}
