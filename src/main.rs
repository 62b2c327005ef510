//! Bid-Crawler main entry point
//!
//! This is the command-line interface for the resumable bid-notice crawler.

use anyhow::{bail, Context};
use bid_crawler::config::{load_config_with_hash, Config};
use bid_crawler::crawler::{
    run_crawl, run_scheduled, AbortReason, CrawlOptions, RunOutcome, Trigger,
};
use bid_crawler::output::{print_report, print_state_summary};
use bid_crawler::state::CrawlState;
use bid_crawler::storage::{JsonStateStore, StateStore};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Bid-Crawler: a resumable crawler for paginated bid-notice listings
///
/// Bid-Crawler walks a listing page by page, fetches each notice's detail
/// page, and checkpoints its progress so that an interrupted run picks up
/// where it stopped.
#[derive(Parser, Debug)]
#[command(name = "bid-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A resumable bid-notice crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Run identifier (overrides the configured run-id)
    #[arg(long, value_name = "ID")]
    run_id: Option<String>,

    /// Last listing page to visit
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Stop after collecting this many records
    #[arg(long, value_name = "N")]
    max_items: Option<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show the stored state of a run and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Start a fresh run every N minutes until interrupted
    #[arg(long, value_name = "N", conflicts_with_all = ["dry_run", "stats", "cron"])]
    interval_minutes: Option<u64>,

    /// Start a fresh run on a cron schedule until interrupted
    #[arg(long, value_name = "EXPR", conflicts_with_all = ["dry_run", "stats"])]
    cron: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }
    if cli.stats {
        return handle_stats(&config, cli.run_id.as_deref());
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match Trigger::from_config(&config.schedule)? {
        Some(trigger) => handle_schedule(config, trigger, cancel).await,
        None => handle_crawl(&config, cli.run_id, !cli.fresh, cancel).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bid_crawler=info,warn"),
            1 => EnvFilter::new("bid_crawler=debug,info"),
            2 => EnvFilter::new("bid_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line limits on top of the configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(max_pages) = cli.max_pages {
        if max_pages == 0 {
            bail!("--max-pages must be >= 1");
        }
        config.crawler.max_pages = Some(max_pages);
    }
    if let Some(max_items) = cli.max_items {
        if max_items == 0 {
            bail!("--max-items must be >= 1");
        }
        config.crawler.max_items = Some(max_items);
    }
    if let Some(minutes) = cli.interval_minutes {
        Trigger::interval(minutes).context("Invalid --interval-minutes")?;
        config.schedule.interval_minutes = Some(minutes);
        config.schedule.cron = None;
    }
    if let Some(expression) = &cli.cron {
        Trigger::cron(expression).context("Invalid --cron")?;
        config.schedule.cron = Some(expression.clone());
        config.schedule.interval_minutes = None;
    }
    Ok(())
}

/// Cancels `token` on Ctrl-C
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current fetch");
            token.cancel();
        }
    });
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Bid-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    match &config.crawler.run_id {
        Some(run_id) => println!("  Run id: {}", run_id),
        None => println!("  Run id: (generated)"),
    }
    println!("  Max pages: {}", fmt_limit(config.crawler.max_pages));
    println!("  Max items: {}", fmt_limit(config.crawler.max_items));
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    println!("  Item delay: {}ms", config.crawler.item_delay_ms);

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}s base, {}s cap",
        config.retry.base_delay, config.retry.max_delay
    );
    println!(
        "  Checkpoint failures tolerated: {}",
        config.retry.max_checkpoint_failures
    );

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  First listing page: {}", config.site.list_url_for(1));
    println!("  Item selector: {}", config.site.item_selector);
    println!("  Id selector: {}", config.site.id_selector);
    println!("  Detail fields ({}):", config.site.detail_fields.len());
    for (name, selector) in &config.site.detail_fields {
        let required = if config.site.required_fields.contains(name) {
            " (required)"
        } else {
            ""
        };
        println!("    - {}: {}{}", name, selector, required);
    }

    println!("\nUser Agent: {}", config.user_agent.user_agent_string());

    println!("\nStorage:");
    println!("  State directory: {}", config.storage.state_dir);
    println!(
        "  Output: {} ({:?})",
        config.storage.output_path, config.storage.output_format
    );

    println!("\nSchedule:");
    match Trigger::from_config(&config.schedule) {
        Ok(Some(trigger)) => println!("  Fresh run {}", trigger),
        Ok(None) => println!("  Single run"),
        Err(e) => println!("  Invalid: {}", e),
    }

    println!("\n✓ Configuration is valid");
}

fn fmt_limit<T: std::fmt::Display>(limit: Option<T>) -> String {
    limit.map_or_else(|| "unlimited".to_string(), |l| l.to_string())
}

/// Handles the --stats mode: shows the stored state of a run
fn handle_stats(config: &Config, run_id: Option<&str>) -> anyhow::Result<()> {
    let store = JsonStateStore::new(&config.storage.state_dir)?;
    println!("State directory: {}\n", config.storage.state_dir);

    let run_id = run_id.or(config.crawler.run_id.as_deref());
    let state = match run_id {
        Some(run_id) => store.load(run_id)?,
        None => latest_run(&store)?,
    };

    match state {
        Some(state) => print_state_summary(&state),
        None => println!("No stored runs found"),
    }
    Ok(())
}

/// Most recently updated run in the store, complete or not
fn latest_run(store: &JsonStateStore) -> anyhow::Result<Option<CrawlState>> {
    let mut latest: Option<CrawlState> = None;
    for run_id in store.run_ids()? {
        let Ok(Some(state)) = store.load(&run_id) else {
            continue;
        };
        if latest
            .as_ref()
            .map_or(true, |l| state.last_updated_at > l.last_updated_at)
        {
            latest = Some(state);
        }
    }
    Ok(latest)
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    run_id: Option<String>,
    resume: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if resume {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    } else {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    }

    let options = CrawlOptions {
        run_id,
        resume,
        cancel,
    };
    let report = run_crawl(config, options).await?;
    print_report(&report);

    match &report.outcome {
        RunOutcome::Aborted {
            reason: AbortReason::Cancelled,
        } => {
            tracing::info!("Run {} can be resumed with --resume", report.run_id);
            Ok(())
        }
        RunOutcome::Aborted { reason } => bail!("Run {} aborted: {}", report.run_id, reason),
        RunOutcome::Completed | RunOutcome::AlreadyCompleted => Ok(()),
    }
}

/// Handles --interval-minutes and --cron: fresh runs until interrupted
async fn handle_schedule(
    config: Config,
    trigger: Trigger,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    run_scheduled(config, trigger, cancel).await?;
    Ok(())
}
