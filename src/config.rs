//! Runtime configuration.
//!
//! Read from an optional YAML file; every field has a default, so running
//! without a file is valid. CLI flags are applied on top with [`Config::apply_cli`].

use crate::cli::Cli;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_FEED_URL: &str = "https://www.eurogamer.net/feed/news";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub feed_url: String,
    /// Only this many entries from the top of the feed are considered.
    pub max_entries: usize,
    pub interval_secs: u64,
    /// Pause before each summarization call.
    pub rate_limit_ms: u64,
    pub page_timeout_secs: u64,
    pub image_timeout_secs: u64,
    /// CSS selector of the element holding the article body paragraphs.
    pub content_selector: String,
    pub user_agent: String,
    pub display_limit: usize,
    /// SQLite file path, or `:memory:` for a process-local store.
    pub database_path: String,
    pub listen_addr: String,
    pub json_output_dir: Option<String>,
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            max_entries: 30,
            interval_secs: 3600,
            rate_limit_ms: 1000,
            page_timeout_secs: 10,
            image_timeout_secs: 3,
            content_selector: "div.article_body".to_string(),
            user_agent: concat!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) ",
                "AppleWebKit/537.36 (KHTML, like Gecko) ",
                "Chrome/127.0.0.0 Safari/537.36"
            )
            .to_string(),
            display_limit: 20,
            database_path: "data/summaries.db".to_string(),
            listen_addr: "127.0.0.1:5001".to_string(),
            json_output_dir: None,
            summarizer: SummarizerConfig::default(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load from `path`, or return the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw, path)?;
        info!(path, feed_url = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str, path: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes to unit, not to an empty mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// CLI flags win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(database) = &cli.database {
            self.database_path = database.clone();
        }
        if let Some(listen) = &cli.listen {
            self.listen_addr = listen.clone();
        }
        if let Some(dir) = &cli.json_output_dir {
            self.json_output_dir = Some(dir.clone());
        }
        if let Some(key) = &cli.openai_api_key {
            self.summarizer.api_key = Some(key.clone());
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.max_entries, 30);
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert_eq!(config.rate_limit(), Duration::from_secs(1));
        assert_eq!(config.image_timeout(), Duration::from_secs(3));
        assert_eq!(config.display_limit, 20);
        assert_eq!(config.summarizer.model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
feed_url: "https://example.com/feed.xml"
interval_secs: 60
summarizer:
  model: "local-model"
  api_base: "http://localhost:8080/v1"
"#;
        let config = Config::from_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(config.feed_url, "https://example.com/feed.xml");
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.max_entries, 30);
        assert_eq!(config.summarizer.model, "local-model");
        assert_eq!(config.summarizer.timeout_secs, 60);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("  \n", "empty.yaml").unwrap();
        assert_eq!(config.database_path, "data/summaries.db");
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = Config::from_yaml("interval_secs: [nope", "bad.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == "bad.yaml"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "display_limit: 5\n").unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.display_limit, 5);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = Config::default();
        let cli = Cli::parse_from([
            "gamer_news",
            "--database",
            ":memory:",
            "--listen",
            "0.0.0.0:8080",
            "--json-output-dir",
            "/tmp/json",
            "--openai-api-key",
            "sk-test",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.json_output_dir.as_deref(), Some("/tmp/json"));
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.summarizer.api_key = Some("sk-secret".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }
}
