use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use bid_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Max retries: {}", config.retry.max_retries);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that runs can be matched to the configuration that
/// produced them.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
[crawler]
max-pages = 5
max-items = 100
fetch-timeout-ms = 5000

[retry]
max-retries = 4
base-delay = 1.5
max-delay = 30.0

[site]
base-url = "https://bids.example.com"
list-url = "https://bids.example.com/notices?page={page}"
item-selector = "table.notices tbody tr"
id-selector = "td.notice-no"
title-selector = "td.title"
link-selector = "td.title a"
next-page-selector = "a.next"
required-fields = ["agency"]

[site.detail-fields]
agency = "dd.agency"
deadline = "dd.deadline"

[user-agent]
crawler-name = "BidCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"

[storage]
state-dir = "./state"
output-path = "./records.jsonl"
"#;
