//! Article page scraper.
//!
//! Fetches one article page, joins the paragraphs of its body container into
//! plain text and checks that the `og:image` lead image actually loads.
//! A missing or broken image never fails the scrape; it only downgrades the
//! result to "no image".

use crate::error::{ConfigError, ScrapeError};
use crate::models::{LeadImage, ScrapeOutcome, ScrapedContent};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());

#[async_trait]
pub trait Scrape: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapeOutcome, ScrapeError>;
}

pub struct ArticleScraper {
    client: Client,
    content_selector: Selector,
    page_timeout: Duration,
    image_timeout: Duration,
}

impl ArticleScraper {
    pub fn new(
        client: Client,
        content_selector: &str,
        page_timeout: Duration,
        image_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let content_selector =
            Selector::parse(content_selector).map_err(|e| ConfigError::Selector {
                selector: content_selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            content_selector,
            page_timeout,
            image_timeout,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        let http_err = |source| ScrapeError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(http_err)?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        info!(%final_url, %status, "Article fetch response");
        if !status.is_success() {
            return Err(ScrapeError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        resp.text().await.map_err(http_err)
    }

    /// GET the candidate image with a short timeout; anything but a success
    /// status means "no image".
    #[instrument(level = "debug", skip_all, fields(image_url = %image_url))]
    async fn validate_image(&self, image_url: String) -> LeadImage {
        match self
            .client
            .get(&image_url)
            .timeout(self.image_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(status = %resp.status(), "Lead image reachable");
                LeadImage::Found(image_url)
            }
            Ok(resp) => {
                let reason = format!("HTTP {}", resp.status().as_u16());
                warn!(%reason, "Lead image rejected");
                LeadImage::Invalid {
                    url: image_url,
                    reason,
                }
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!(%reason, "Lead image unreachable");
                LeadImage::Invalid {
                    url: image_url,
                    reason,
                }
            }
        }
    }
}

#[async_trait]
impl Scrape for ArticleScraper {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn scrape(&self, url: &str) -> Result<ScrapeOutcome, ScrapeError> {
        let body = self.fetch_page(url).await?;
        let extracted = extract(&body, url, &self.content_selector);

        let Some(body_text) = extracted.body_text else {
            warn!("No article body container found");
            return Ok(ScrapeOutcome::NoContent);
        };

        let image = match extracted.image {
            ImageCandidate::Url(image_url) => self.validate_image(image_url).await,
            ImageCandidate::Missing => LeadImage::NotFound,
            ImageCandidate::Unresolvable { raw, reason } => LeadImage::Invalid { url: raw, reason },
        };

        info!(
            bytes = body_text.len(),
            image = image.url().unwrap_or("<none>"),
            "Parsed article"
        );
        Ok(ScrapeOutcome::Found(ScrapedContent { body_text, image }))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ImageCandidate {
    Url(String),
    Missing,
    Unresolvable { raw: String, reason: String },
}

#[derive(Debug)]
struct Extracted {
    body_text: Option<String>,
    image: ImageCandidate,
}

/// Synchronous HTML pass; the parsed document never lives across an await.
fn extract(html: &str, page_url: &str, content_selector: &Selector) -> Extracted {
    let document = Html::parse_document(html);

    let body_text = document.select(content_selector).next().map(|container| {
        container
            .select(&PARAGRAPH)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    });

    let image = match document
        .select(&OG_IMAGE)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        None => ImageCandidate::Missing,
        Some(raw) => match Url::parse(page_url).and_then(|base| base.join(raw)) {
            Ok(resolved) => ImageCandidate::Url(resolved.to_string()),
            Err(e) => ImageCandidate::Unresolvable {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        },
    };

    Extracted { body_text, image }
}
