use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Bid-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Crawl scope and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Fixed run identifier; a timestamp is generated when absent
    #[serde(rename = "run-id", default)]
    pub run_id: Option<String>,

    /// Last listing page to visit (1-based, inclusive)
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Stop once this many records have been collected
    #[serde(rename = "max-items", default)]
    pub max_items: Option<u64>,

    /// Upper bound for a single listing or detail fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Pause between listing pages (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Pause between detail fetches (milliseconds)
    #[serde(rename = "item-delay-ms", default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_page_delay_ms() -> u64 {
    1_000
}

fn default_item_delay_ms() -> u64 {
    500
}

/// Retry and checkpoint tolerance
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per listing page or detail item
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds
    #[serde(rename = "base-delay", default = "default_base_delay")]
    pub base_delay: f64,

    /// Backoff cap in seconds
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: f64,

    /// Consecutive failed checkpoints tolerated before the run aborts
    #[serde(
        rename = "max-checkpoint-failures",
        default = "default_max_checkpoint_failures"
    )]
    pub max_checkpoint_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_checkpoint_failures: default_max_checkpoint_failures(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_max_checkpoint_failures() -> u32 {
    3
}

/// Target site and the selectors used to read it
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base URL used to resolve relative detail links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing URL template; `{page}` is replaced with the page number
    #[serde(rename = "list-url")]
    pub list_url: String,

    /// Selects one element per listing row
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Selects the notice number inside a row
    #[serde(rename = "id-selector")]
    pub id_selector: String,

    /// Selects the notice title inside a row
    #[serde(rename = "title-selector", default)]
    pub title_selector: Option<String>,

    /// Selects the anchor to the detail page inside a row
    #[serde(rename = "link-selector", default)]
    pub link_selector: Option<String>,

    /// Present on the page when another listing page follows
    #[serde(rename = "next-page-selector", default)]
    pub next_page_selector: Option<String>,

    /// Element whose text holds the total page count
    #[serde(rename = "total-pages-selector", default)]
    pub total_pages_selector: Option<String>,

    /// Extra listing columns: field name -> selector inside the row
    #[serde(rename = "list-fields", default)]
    pub list_fields: BTreeMap<String, String>,

    /// Detail page fields: field name -> selector on the detail page
    #[serde(rename = "detail-fields", default)]
    pub detail_fields: BTreeMap<String, String>,

    /// Detail fields whose absence makes the record malformed
    #[serde(rename = "required-fields", default)]
    pub required_fields: Vec<String>,
}

impl SiteConfig {
    /// Listing URL for the given page number
    pub fn list_url_for(&self, page: u32) -> String {
        self.list_url.replace("{page}", &page.to_string())
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL)
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one state file per run
    #[serde(rename = "state-dir")]
    pub state_dir: String,

    /// Where collected records are written
    #[serde(rename = "output-path")]
    pub output_path: String,

    /// Record output format
    #[serde(rename = "output-format", default)]
    pub output_format: OutputFormat,
}

/// Supported record output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Jsonl,
    /// Comma-separated values with a header row
    Csv,
    /// JSON Lines at `output-path` plus CSV next to it (`.csv` extension)
    Both,
    /// A `records` table in a SQLite database
    Sqlite,
}

/// robots.txt handling
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    /// Refuse to crawl listing URLs disallowed by robots.txt
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raise the page delay to the site's Crawl-delay
    #[serde(rename = "respect-crawl-delay", default = "default_true")]
    pub respect_crawl_delay: bool,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_crawl_delay: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Periodic re-run settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Start a new run every N minutes
    #[serde(rename = "interval-minutes", default)]
    pub interval_minutes: Option<u64>,

    /// Start a new run on a cron schedule
    ///
    /// Five fields (`minute hour day month weekday`) or the six/seven field
    /// form with leading seconds.
    #[serde(default)]
    pub cron: Option<String>,
}
