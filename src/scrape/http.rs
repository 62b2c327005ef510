//! HTTP scraper implementation
//!
//! `HttpScraper` fetches listing and detail pages with reqwest and extracts
//! them with `PageParser`. Every failure is classified for the retry policy:
//!
//! | Condition | Kind |
//! |-----------|------|
//! | Timeout, connection error | Transient |
//! | HTTP 408, 429, 5xx | Transient |
//! | HTTP 404, 410, other 4xx | Permanent |
//! | Missing detail link or required field | Permanent |
//! | Invalid request (bad URL) | Permanent |

use crate::config::{SiteConfig, UserAgentConfig};
use crate::scrape::parser::PageParser;
use crate::scrape::traits::{
    DetailRecord, DetailSource, FetchError, FetchResult, ListingItem, ListingPage, ListingSource,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Builds an HTTP client that identifies the crawler
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Upper bound for a whole request
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent_string())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps an HTTP status to a retry classification
pub fn classify_status(status: StatusCode) -> FetchError {
    let message = format!("HTTP {}", status.as_u16());
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::transient(message)
        }
        s if s.is_server_error() => FetchError::transient(message),
        _ => FetchError::permanent(message),
    }
}

/// Maps a reqwest transport error to a retry classification
pub fn classify_transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_builder() || err.is_redirect() {
        FetchError::permanent(err.to_string())
    } else if err.is_timeout() {
        FetchError::transient(format!("timed out: {}", err))
    } else {
        FetchError::transient(err.to_string())
    }
}

/// Scraper for one configured site
///
/// Implements both fetch traits. Cloning is cheap: clones share the same
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: Client,
    parser: PageParser,
    list_url: String,
}

impl HttpScraper {
    /// Creates a scraper from an existing client
    pub fn new(client: Client, site: &SiteConfig) -> crate::Result<Self> {
        Ok(Self {
            client,
            parser: PageParser::from_config(site)?,
            list_url: site.list_url.clone(),
        })
    }

    /// Creates a scraper with its own client
    pub fn from_config(
        site: &SiteConfig,
        user_agent: &UserAgentConfig,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = build_http_client(user_agent, timeout)?;
        Self::new(client, site)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches `url` and returns its body, classifying any failure
    async fn get_html(&self, url: &str) -> FetchResult<String> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))
    }
}

#[async_trait]
impl ListingSource for HttpScraper {
    async fn fetch_list(&self, page: u32) -> FetchResult<ListingPage> {
        let url = self.list_url.replace("{page}", &page.to_string());
        let html = self.get_html(&url).await?;
        self.parser.parse_listing(&html, page)
    }
}

#[async_trait]
impl DetailSource for HttpScraper {
    async fn fetch_detail(&self, item: &ListingItem) -> FetchResult<DetailRecord> {
        let url = item.detail_url.as_deref().ok_or_else(|| {
            FetchError::permanent(format!("listing item {} has no detail link", item.id))
        })?;

        let html = self.get_html(url).await?;
        let fields = self.parser.parse_detail(item, &html)?;
        Ok(DetailRecord::new(item.clone(), fields))
    }
}
