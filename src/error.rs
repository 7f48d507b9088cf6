//! Error types for each stage of the ingestion pipeline.
//!
//! Every stage has its own error enum so the pipeline can tell a skipped
//! cycle (feed) from a skipped candidate (scrape, summarize, store).

use std::time::Duration;
use thiserror::Error;

/// The feed endpoint could not be read or did not contain a feed.
///
/// The whole cycle is skipped and retried after one interval.
#[derive(Debug, Error)]
pub enum FeedFetchError {
    #[error("HTTP error fetching feed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("malformed feed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document is not an RSS or Atom feed")]
    NotAFeed,
}

/// An article page could not be fetched.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

/// The text-generation service call failed.
///
/// This is distinct from the sentinel summary, which is a successful call.
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("HTTP error calling text-generation service: {0}")]
    Http(#[source] reqwest::Error),

    #[error("text-generation service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("text-generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("text-generation service returned an empty completion")]
    EmptyCompletion,
}

impl SummarizationError {
    /// Transient failures worth another attempt: network errors, timeouts,
    /// rate limiting and server-side errors.
    pub fn is_retriable(&self) -> bool {
        match self {
            SummarizationError::Http(_) | SummarizationError::Timeout(_) => true,
            SummarizationError::UnexpectedStatus { status, .. } => {
                *status == 429 || (500..=599).contains(status)
            }
            SummarizationError::EmptyCompletion => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid timestamp {value:?} stored for {url}: {source}")]
    Timestamp {
        url: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to create database directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Startup-time configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid CSS selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("no API key for the text-generation service (set OPENAI_API_KEY or summarizer.api_key)")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Why a single candidate was dropped. Nothing is persisted for it.
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("store lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("no article content container on page")]
    NoContent,

    #[error("summarization failed: {0}")]
    Summarize(#[from] SummarizationError),

    #[error("store upsert failed: {0}")]
    Persist(#[source] StoreError),
}
