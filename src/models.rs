use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author recorded when the feed entry names none.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// A feed entry not yet checked against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub url: String,
    pub title: String,
    /// Teaser markup from the feed, not the generated summary.
    pub raw_summary_html: String,
    pub published_at: String,
    pub author: String,
}

/// Result of looking for and validating an article's lead image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadImage {
    Found(String),
    NotFound,
    Invalid { url: String, reason: String },
}

impl LeadImage {
    pub fn url(&self) -> Option<&str> {
        match self {
            LeadImage::Found(url) => Some(url),
            LeadImage::NotFound | LeadImage::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedContent {
    pub body_text: String,
    pub image: LeadImage,
}

impl ScrapedContent {
    pub fn image_url(&self) -> Option<&str> {
        self.image.url()
    }
}

/// What a successful page fetch yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Found(ScrapedContent),
    /// The page loaded but had no article body container.
    NoContent,
}

/// A persisted summary, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SummaryRecord {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
