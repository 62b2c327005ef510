//! Robots.txt handling module
//!
//! This module fetches and interprets the robots.txt of the listing host.
//! It is consulted once, before the first listing fetch of a run.

mod parser;

pub use parser::RobotsRules;

use crate::Result;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

/// Returns the robots.txt URL for the host serving `page_url`
pub fn robots_url(page_url: &str) -> Result<Url> {
    let mut url = Url::parse(page_url)?;
    url.set_path("/robots.txt");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Fetches robots.txt for the host serving `page_url`
///
/// # Arguments
///
/// * `client` - HTTP client carrying the crawler's user agent
/// * `page_url` - Any URL on the host
///
/// # Returns
///
/// * `Ok(RobotsRules)` - Parsed rules; allow-all if robots.txt is missing or unreachable
/// * `Err(CrawlError)` - `page_url` is not a valid URL
pub async fn fetch_robots(client: &Client, page_url: &str) -> Result<RobotsRules> {
    let url = robots_url(page_url)?;

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Could not fetch {}: {}; assuming allow-all", url, e);
            return Ok(RobotsRules::allow_all());
        }
    };

    let status = response.status();
    if !status.is_success() {
        debug!("{} returned {}; assuming allow-all", url, status);
        return Ok(RobotsRules::allow_all());
    }

    match response.text().await {
        Ok(body) => Ok(RobotsRules::from_content(&body)),
        Err(e) => {
            warn!("Could not read {}: {}; assuming allow-all", url, e);
            Ok(RobotsRules::allow_all())
        }
    }
}

/// Checks if a URL is allowed by robots.txt
///
/// # Returns
///
/// * `true` - If the URL is allowed
/// * `false` - If the URL is disallowed
pub fn is_allowed(rules: &RobotsRules, url: &str, agent: &str) -> bool {
    rules.is_allowed(url, agent)
}
