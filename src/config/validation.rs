use crate::config::types::{
    Config, CrawlerConfig, OutputFormat, RetryConfig, ScheduleConfig, SiteConfig,
    StorageConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::path::Path;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_site_config(&config.site)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_schedule_config(&config.schedule)?;
    Ok(())
}

/// Validates crawl scope and pacing
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if let Some(run_id) = &config.run_id {
        validate_run_id(run_id)?;
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.max_items == Some(0) {
        return Err(ConfigError::Validation(
            "max_items must be >= 1 when set".to_string(),
        ));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    Ok(())
}

/// Validates retry and checkpoint settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if !(config.base_delay.is_finite() && config.base_delay > 0.0) {
        return Err(ConfigError::Validation(format!(
            "base_delay must be a positive number of seconds, got {}",
            config.base_delay
        )));
    }

    if !config.max_delay.is_finite() || config.max_delay < config.base_delay {
        return Err(ConfigError::Validation(format!(
            "max_delay must be >= base_delay ({}), got {}",
            config.base_delay, config.max_delay
        )));
    }

    if config.max_checkpoint_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max_checkpoint_failures must be >= 1, got {}",
            config.max_checkpoint_failures
        )));
    }

    Ok(())
}

/// Validates site URLs and selectors
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if !config.list_url.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "list_url must contain a {{page}} placeholder, got '{}'",
            config.list_url
        )));
    }

    Url::parse(&config.list_url_for(1))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid list_url: {}", e)))?;

    validate_selector(&config.item_selector)?;
    validate_selector(&config.id_selector)?;

    for selector in [
        &config.title_selector,
        &config.link_selector,
        &config.next_page_selector,
        &config.total_pages_selector,
    ]
    .into_iter()
    .flatten()
    {
        validate_selector(selector)?;
    }

    for selector in config
        .list_fields
        .values()
        .chain(config.detail_fields.values())
    {
        validate_selector(selector)?;
    }

    for field in &config.required_fields {
        if !config.detail_fields.contains_key(field) {
            return Err(ConfigError::Validation(format!(
                "required field '{}' has no entry in detail_fields",
                field
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates output configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.state_dir.is_empty() {
        return Err(ConfigError::Validation(
            "state_dir cannot be empty".to_string(),
        ));
    }

    if config.output_path.is_empty() {
        return Err(ConfigError::Validation(
            "output_path cannot be empty".to_string(),
        ));
    }

    if config.output_format == OutputFormat::Both
        && Path::new(&config.output_path)
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
    {
        return Err(ConfigError::Validation(
            "output_format 'both' writes CSV next to output_path; use a .jsonl output_path".to_string(),
        ));
    }

    Ok(())
}

/// Longest accepted interval between scheduled runs (one year)
pub const MAX_INTERVAL_MINUTES: u64 = 525_600;

fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if let Some(minutes) = config.interval_minutes {
        validate_interval_minutes(minutes)?;
    }

    if let Some(expression) = &config.cron {
        if config.interval_minutes.is_some() {
            return Err(ConfigError::Validation(
                "interval_minutes and cron are mutually exclusive".to_string(),
            ));
        }
        validate_cron_fields(expression)?;
    }
    Ok(())
}

/// Checks an interval against `1..=MAX_INTERVAL_MINUTES`
pub fn validate_interval_minutes(minutes: u64) -> Result<(), ConfigError> {
    if minutes == 0 || minutes > MAX_INTERVAL_MINUTES {
        return Err(ConfigError::Validation(format!(
            "interval_minutes must be between 1 and {}, got {}",
            MAX_INTERVAL_MINUTES, minutes
        )));
    }
    Ok(())
}

/// Checks the field count of a cron expression
///
/// Field syntax is checked by the scheduler when the job is registered.
pub fn validate_cron_fields(expression: &str) -> Result<(), ConfigError> {
    let fields = expression.split_whitespace().count();
    if !(5..=7).contains(&fields) {
        return Err(ConfigError::Validation(format!(
            "cron expression must have 5 to 7 fields, got {} in '{}'",
            fields, expression
        )));
    }
    Ok(())
}

/// Validates a run identifier
///
/// Run ids become state file names, so they are restricted to characters that
/// are safe in a path component.
pub fn validate_run_id(run_id: &str) -> Result<(), ConfigError> {
    if run_id.is_empty() {
        return Err(ConfigError::Validation("run_id cannot be empty".to_string()));
    }

    if !run_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "run_id must contain only ASCII letters, digits, '-' and '_', got '{}'",
            run_id
        )));
    }

    Ok(())
}

/// Validates that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}
