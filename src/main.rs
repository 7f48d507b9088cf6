//! # gamer_news
//!
//! Polls the Eurogamer news feed once an hour, scrapes every article it has
//! not seen before, asks a chat-completion model for a short summary and
//! stores the result keyed by article URL. The newest summaries are served as
//! an HTML page and as JSON.
//!
//! ## Processing pipeline
//!
//! 1. **Feed**: fetch and parse the RSS/Atom feed ([`scrapers::feed`])
//! 2. **Dedup**: skip URLs already in the store ([`dedup`])
//! 3. **Scrape**: article body text plus a validated lead image ([`scrapers::article`])
//! 4. **Summarize**: one chat-completion call per article ([`summarizer`], [`api`])
//! 5. **Persist**: upsert into SQLite or memory ([`store`])
//!
//! The loop lives in [`scheduler`]; the display side in [`server`] only reads.
//!
//! ## Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... gamer_news --config config.yaml --listen 0.0.0.0:5001
//! gamer_news --database :memory: --once -j ./out
//! ```

mod api;
mod cli;
mod clock;
mod config;
mod dedup;
mod error;
mod models;
mod outputs;
mod pipeline;
mod scheduler;
mod scrapers;
mod server;
mod store;
mod summarizer;
mod utils;

use api::{ChatCompletionsClient, RetryAsk};
use clap::Parser;
use cli::Cli;
use clock::{Clock, SystemClock};
use config::Config;
use error::ConfigError;
use pipeline::IngestionPipeline;
use scheduler::Scheduler;
use scrapers::article::ArticleScraper;
use scrapers::build_http_client;
use scrapers::feed::FeedFetcher;
use server::{build_app, AppState};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use summarizer::{Summarizer, SYSTEM_PROMPT};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("gamer_news starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.database, ?args.listen, args.once, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_cli(&args);

    let api_key = config
        .summarizer
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)?;

    let store = store::open(&config.database_path).await?;
    info!(
        path = %config.database_path,
        existing = store.count().await?,
        "Summary store ready"
    );

    let http = build_http_client(&config.user_agent).map_err(ConfigError::HttpClient)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let feed = Arc::new(FeedFetcher::new(
        http.clone(),
        &config.feed_url,
        config.max_entries,
        config.page_timeout(),
    ));
    let scraper = Arc::new(ArticleScraper::new(
        http.clone(),
        &config.content_selector,
        config.page_timeout(),
        config.image_timeout(),
    )?);
    let api = RetryAsk::new(
        ChatCompletionsClient::new(http, &config.summarizer, &api_key, SYSTEM_PROMPT),
        clock.clone(),
        config.summarizer.max_retries,
        config.summarizer.retry_base_delay(),
    );
    let summarizer = Arc::new(Summarizer::new(api));

    let pipeline = IngestionPipeline::new(
        store.clone(),
        scraper,
        summarizer,
        clock.clone(),
        config.rate_limit(),
    );
    let mut scheduler = Scheduler::new(feed, pipeline, clock, config.interval());

    if let Some(dir) = &config.json_output_dir {
        let dir = PathBuf::from(dir);
        if let Err(e) = ensure_writable_dir(&dir).await {
            error!(dir = %dir.display(), error = %e, "JSON output dir is not writable");
            return Err(e.into());
        }
        scheduler = scheduler.with_snapshot(store.clone(), dir, config.display_limit);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if args.once {
        let report = scheduler.run_cycle(&shutdown_rx).await?;
        info!(
            ?report,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Single cycle finished"
        );
        return Ok(());
    }

    let ingest = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let app = build_app(AppState {
        store,
        display_limit: config.display_limit,
    });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Serving summaries");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = ingest.await {
        error!(error = %e, "Scheduler task panicked");
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "gamer_news stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Received shutdown signal, starting graceful shutdown");
}
