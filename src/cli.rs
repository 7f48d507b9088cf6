use clap::Parser;

/// Poll the news feed hourly, summarise new articles and serve the latest summaries.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// SQLite database path (`:memory:` keeps summaries in memory only)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Address the summaries page is served on
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Output directory for a JSON snapshot of the latest summaries
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Run a single ingestion cycle and exit
    #[arg(long)]
    pub once: bool,

    /// API key for the text-generation service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "gamer_news",
            "--config",
            "./config.yaml",
            "--database",
            "./data/summaries.db",
            "--once",
        ]);

        assert_eq!(cli.config.as_deref(), Some("./config.yaml"));
        assert_eq!(cli.database.as_deref(), Some("./data/summaries.db"));
        assert!(cli.once);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "gamer_news",
            "-c",
            "/etc/gamer_news.yaml",
            "-l",
            "0.0.0.0:5001",
            "-j",
            "/tmp/json",
        ]);

        assert_eq!(cli.config.as_deref(), Some("/etc/gamer_news.yaml"));
        assert_eq!(cli.listen.as_deref(), Some("0.0.0.0:5001"));
        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/json"));
        assert!(!cli.once);
    }
}
