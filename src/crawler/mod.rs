//! Crawler module for walking a paginated listing
//!
//! This module contains the core crawling logic, including:
//! - The orchestrator phases and their legal transitions
//! - The page/item loop with retries, dedup and checkpoints
//! - Run parameters, outcomes and the final report
//! - Interval and cron scheduling of fresh runs
//! - Wiring the HTTP scraper, robots.txt, state store and record sink together

mod coordinator;
mod params;
mod phase;
mod report;
mod schedule;

pub use coordinator::Coordinator;
pub use params::RunParameters;
pub use phase::CrawlPhase;
pub use report::{AbortReason, CrawlReport, RunOutcome};
pub use schedule::{run_scheduled, Trigger};

use crate::config::{validate_run_id, Config, OutputFormat, SiteConfig};
use crate::output::{CsvSink, JsonLinesSink, SinkObserver, SqliteSink};
use crate::robots::fetch_robots;
use crate::scrape::HttpScraper;
use crate::storage::{JsonStateStore, StateStore};
use crate::{CrawlError, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// How the CLI wants a run to start
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Explicit run id; overrides the configured one
    pub run_id: Option<String>,

    /// Resume a stored, incomplete run when possible
    pub resume: bool,

    /// Stop signal for the run
    pub cancel: CancellationToken,
}

/// Generates a run id from the current local time (`%Y%m%d_%H%M%S`)
pub fn generate_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Picks the run id for a new session
///
/// An explicit id wins. Otherwise, when resuming, the most recently updated
/// incomplete run is picked up. Failing both, a timestamp id is generated.
pub fn resolve_run_id<S: StateStore + ?Sized>(
    store: &S,
    explicit: Option<&str>,
    resume: bool,
) -> Result<String> {
    if let Some(run_id) = explicit {
        validate_run_id(run_id)?;
        return Ok(run_id.to_string());
    }

    if resume {
        if let Some(run_id) = store.latest_incomplete_run()? {
            tracing::info!("Picking up incomplete run {}", run_id);
            return Ok(run_id);
        }
    }

    Ok(generate_run_id())
}

/// CSV columns after the fixed ones: listing fields, then detail fields
pub fn csv_fields(site: &SiteConfig) -> Vec<String> {
    let mut fields: Vec<String> = site.list_fields.keys().cloned().collect();
    for name in site.detail_fields.keys() {
        if !fields.contains(name) {
            fields.push(name.clone());
        }
    }
    fields
}

/// Runs a complete crawl operation against the configured site
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the state store and pick the run id
/// 2. Build the HTTP scraper
/// 3. Check robots.txt for the listing URL and apply its Crawl-delay
/// 4. Attach the configured record sink
/// 5. Run the orchestrator to a terminal phase
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Run id, resume flag and stop signal
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run reached a terminal phase
/// * `Err(CrawlError)` - Setup failed (state unreadable, robots.txt denial, bad output path)
pub async fn run_crawl(config: &Config, options: CrawlOptions) -> Result<CrawlReport> {
    let store = JsonStateStore::new(&config.storage.state_dir)?;

    let explicit = options.run_id.as_deref().or(config.crawler.run_id.as_deref());
    let run_id = resolve_run_id(&store, explicit, options.resume)?;

    let mut params = RunParameters::from_config(config, run_id, options.resume);
    let scraper = HttpScraper::from_config(&config.site, &config.user_agent, params.fetch_timeout)?;

    if config.robots.enabled {
        let first_page = config.site.list_url_for(1);
        let agent = &config.user_agent.crawler_name;
        let rules = fetch_robots(scraper.client(), &first_page).await?;

        if !rules.is_allowed(&first_page, agent) {
            tracing::error!("robots.txt disallows {}", first_page);
            return Err(CrawlError::Robots { url: first_page });
        }

        if config.robots.respect_crawl_delay {
            if let Some(delay) = rules.crawl_delay(agent) {
                tracing::info!("robots.txt asks for a {:?} crawl delay", delay);
                params.page_delay = params.page_delay.max(delay);
                params.item_delay = params.item_delay.max(delay);
            }
        }
    }

    let mut coordinator = Coordinator::new(scraper.clone(), scraper, store, params)
        .with_cancellation(options.cancel);

    let output_path = Path::new(&config.storage.output_path);
    match config.storage.output_format {
        OutputFormat::Jsonl => {
            coordinator.add_observer(SinkObserver::new(JsonLinesSink::open(output_path)?))
        }
        OutputFormat::Csv => coordinator.add_observer(SinkObserver::new(CsvSink::open(
            output_path,
            csv_fields(&config.site),
        )?)),
        OutputFormat::Both => {
            coordinator.add_observer(SinkObserver::new(JsonLinesSink::open(output_path)?));
            coordinator.add_observer(SinkObserver::new(CsvSink::open(
                &output_path.with_extension("csv"),
                csv_fields(&config.site),
            )?));
        }
        OutputFormat::Sqlite => {
            coordinator.add_observer(SinkObserver::new(SqliteSink::open(output_path)?))
        }
    }

    coordinator.run().await
}
