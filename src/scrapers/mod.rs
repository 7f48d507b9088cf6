//! Fetching and parsing of the news feed and the article pages it links to.
//!
//! Two phases, as for every source this project has scraped:
//!
//! 1. **Indexing**: [`feed`] turns the RSS/Atom feed into article candidates
//! 2. **Fetching**: [`article`] downloads one page, extracts its body text and
//!    validates its lead image
//!
//! Both share one [`reqwest::Client`] built by [`build_http_client`]; timeouts
//! are set per request since page, image and feed fetches use different ones.

pub mod article;
pub mod feed;

use reqwest::Client;
use std::time::Duration;

pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .pool_idle_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}
