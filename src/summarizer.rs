//! Article text to short summary.
//!
//! Wraps an [`AskAsync`] backend with the fixed instruction used for every
//! article. Pages that are only a JavaScript or ad-blocker wall never reach the
//! backend; they get [`SENTINEL_SUMMARY`] directly.

use crate::api::AskAsync;
use crate::error::SummarizationError;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

/// Returned for text that has nothing to summarize. A successful result.
pub const SENTINEL_SUMMARY: &str = "Could not summarize article.";

pub const SYSTEM_PROMPT: &str = concat!(
    "You are a helpful assistant that summarizes articles. ",
    "Given an article text, possibly including unrelated scraping artefacts, ",
    "return a summary of the article. ",
    "If the text is just something like 'enable javascript' or 'turn off your ad blocker', ",
    "just respond with \"Could not summarize article.\" ",
    "Otherwise, respond with just the summary (no preamble). ",
    "Favour extremely conciseness and brevity. ",
    "Start directly with the contents. Aim for <100 words."
);

static BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(please\s+)?(enable|turn\s+on|activate)\s+javascript(\s+to\s+continue)?",
        r"|(please\s+)?(turn\s+off|disable|pause)\s+(your\s+)?ad[\s-]?blocker",
        r"|this\s+site\s+requires\s+javascript",
    ))
    .unwrap()
});

/// A reply that is nothing but the sentinel, give or take an apology and punctuation.
static SENTINEL_REPLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*["']?(sorry,?\s*)?(i\s+)?could\s+not\s+summari[sz]e\s+(the\s+|this\s+)?article\.?["']?\s*$"#)
        .unwrap()
});

/// Below this many words of non-boilerplate text, a page is a wall, not an article.
const MIN_REMAINING_WORDS: usize = 8;

#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError>;
}

pub struct Summarizer<A> {
    api: A,
}

impl<A: AskAsync> Summarizer<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: AskAsync> Summarize for Summarizer<A> {
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    async fn summarize(&self, text: &str) -> Result<String, SummarizationError> {
        if is_degenerate(text) {
            info!(text = %truncate_for_log(text.trim(), 80), "Degenerate article text; using sentinel");
            return Ok(SENTINEL_SUMMARY.to_string());
        }

        let prompt = format!("Please summarize the following text: {text}");
        let reply = self.api.ask(&prompt).await?;
        let summary = normalize_reply(&reply)?;
        info!(words = summary.split_whitespace().count(), "Summarized article");
        Ok(summary)
    }
}

fn is_degenerate(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return true;
    }
    if !BOILERPLATE.is_match(text) {
        return false;
    }
    let remaining = BOILERPLATE.replace_all(text, " ");
    remaining.split_whitespace().count() < MIN_REMAINING_WORDS
}

fn normalize_reply(reply: &str) -> Result<String, SummarizationError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(SummarizationError::EmptyCompletion);
    }
    if SENTINEL_REPLY.is_match(reply) {
        return Ok(SENTINEL_SUMMARY.to_string());
    }
    Ok(reply.to_string())
}
