//! Repeated runs on a fixed interval or a cron schedule
//!
//! Every scheduled run is a fresh run with a generated id. A cron tick that
//! fires while the previous run is still going is skipped.

use crate::config::{validate_cron_fields, validate_interval_minutes, Config, ScheduleConfig};
use crate::crawler::{run_crawl, CrawlOptions};
use crate::output::print_report;
use crate::{ConfigError, ConfigResult, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// When scheduled runs start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Every `Duration`, starting immediately
    Interval(Duration),

    /// On a cron expression with a leading seconds field
    Cron(String),
}

impl Trigger {
    /// Trigger configured in `[schedule]`, if any
    pub fn from_config(schedule: &ScheduleConfig) -> ConfigResult<Option<Self>> {
        match (schedule.interval_minutes, &schedule.cron) {
            (Some(_), Some(_)) => Err(ConfigError::Validation(
                "interval_minutes and cron are mutually exclusive".to_string(),
            )),
            (Some(minutes), None) => Self::interval(minutes).map(Some),
            (None, Some(expression)) => Self::cron(expression).map(Some),
            (None, None) => Ok(None),
        }
    }

    pub fn interval(minutes: u64) -> ConfigResult<Self> {
        validate_interval_minutes(minutes)?;
        let secs = minutes.checked_mul(60).ok_or_else(|| {
            ConfigError::Validation(format!("interval of {} minutes is too long", minutes))
        })?;
        Ok(Self::Interval(Duration::from_secs(secs)))
    }

    /// Builds a cron trigger; five-field expressions get a `0` seconds field
    pub fn cron(expression: &str) -> ConfigResult<Self> {
        validate_cron_fields(expression)?;
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let normalized = if fields.len() == 5 {
            format!("0 {}", fields.join(" "))
        } else {
            fields.join(" ")
        };
        Ok(Self::Cron(normalized))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(period) => write!(f, "every {} minutes", period.as_secs() / 60),
            Self::Cron(expression) => write!(f, "cron '{}'", expression),
        }
    }
}

/// Starts fresh runs on `trigger` until `cancel` fires
///
/// A run in progress when `cancel` fires stops at its next stop check, like a
/// single interactive run.
pub async fn run_scheduled(
    mut config: Config,
    trigger: Trigger,
    cancel: CancellationToken,
) -> Result<()> {
    if config.crawler.run_id.take().is_some() {
        tracing::warn!("Ignoring configured run-id; scheduled runs get generated ids");
    }
    tracing::info!("Starting scheduled runs {}", trigger);

    match trigger {
        Trigger::Interval(period) => run_on_interval(&config, period, &cancel).await,
        Trigger::Cron(expression) => run_on_cron(config, &expression, cancel).await?,
    }

    tracing::info!("Scheduler stopped");
    Ok(())
}

async fn run_on_interval(config: &Config, period: Duration, cancel: &CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        scheduled_run(config, cancel.clone()).await;
        if cancel.is_cancelled() {
            break;
        }
    }
}

async fn run_on_cron(config: Config, expression: &str, cancel: CancellationToken) -> Result<()> {
    let config = Arc::new(config);
    let busy = Arc::new(Mutex::new(()));
    let job_cancel = cancel.clone();

    let mut scheduler = JobScheduler::new().await?;
    let job = Job::new_async(expression, move |_uuid, _lock| {
        let config = config.clone();
        let busy = busy.clone();
        let cancel = job_cancel.clone();
        Box::pin(async move {
            let Ok(_guard) = busy.try_lock() else {
                tracing::warn!("Previous scheduled run still in progress; skipping this tick");
                return;
            };
            scheduled_run(&config, cancel).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    cancel.cancelled().await;
    scheduler.shutdown().await?;
    Ok(())
}

async fn scheduled_run(config: &Config, cancel: CancellationToken) {
    if cancel.is_cancelled() {
        return;
    }

    let options = CrawlOptions {
        run_id: None,
        resume: false,
        cancel,
    };
    match run_crawl(config, options).await {
        Ok(report) => print_report(&report),
        Err(e) => tracing::error!("Scheduled run failed: {}", e),
    }
}
