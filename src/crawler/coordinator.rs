//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates one run:
//! - Initializing or resuming state from the store
//! - Walking listing pages in order and items in listing order
//! - Skipping already collected ids before any detail fetch
//! - Retrying fetches per the retry policy
//! - Checkpointing at page boundaries and at the end of the run
//! - Honoring the stop signal

use crate::crawler::params::RunParameters;
use crate::crawler::phase::CrawlPhase;
use crate::crawler::report::{AbortReason, CrawlReport, RunOutcome};
use crate::output::ItemObserver;
use crate::retry::{run_with_retry, RetryOutcome};
use crate::scrape::{DetailRecord, DetailSource, ListingPage, ListingSource};
use crate::state::CrawlState;
use crate::storage::{initialize, StartingPoint, StateStore};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Result of processing one listing page
enum PageFlow {
    /// All items were handled; move on to the page boundary
    Finished,

    /// `max_items` was reached part-way through the page
    ItemLimitReached,

    /// The run must stop
    Abort(AbortReason),
}

/// Main crawler coordinator structure
///
/// Owns both fetchers, the state store and the observers for the duration of
/// a run. The crawl state itself is a local value of `run`.
pub struct Coordinator<L, D, S> {
    listing: L,
    detail: D,
    store: S,
    params: RunParameters,
    cancel: CancellationToken,
    observers: Vec<Box<dyn ItemObserver + Send>>,
    phase: CrawlPhase,
    checkpoint_failures: u32,
}

impl<L, D, S> Coordinator<L, D, S>
where
    L: ListingSource,
    D: DetailSource,
    S: StateStore,
{
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `listing` - Source of listing pages
    /// * `detail` - Source of detail records
    /// * `store` - Durable state backend
    /// * `params` - Run identity, limits and pacing
    pub fn new(listing: L, detail: D, store: S, params: RunParameters) -> Self {
        Self {
            listing,
            detail,
            store,
            params,
            cancel: CancellationToken::new(),
            observers: Vec::new(),
            phase: CrawlPhase::Initializing,
            checkpoint_failures: 0,
        }
    }

    /// Uses `token` as the stop signal instead of a private one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Registers an observer for collected records
    pub fn add_observer(&mut self, observer: impl ItemObserver + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the crawl until it completes or aborts
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run reached a terminal phase; see `outcome`
    /// * `Err(CrawlError)` - The stored state could not be read, or the run
    ///   hit an internal inconsistency
    pub async fn run(&mut self) -> Result<CrawlReport> {
        let session_start = Instant::now();
        let start = match initialize(&self.store, &self.params.run_id, self.params.resume) {
            Ok(start) => start,
            Err(e) => {
                self.phase = CrawlPhase::Aborted;
                self.close_sources().await;
                return Err(e.into());
            }
        };

        let mut state = match start {
            StartingPoint::AlreadyCompleted(state) => {
                self.transition(CrawlPhase::Completed)?;
                self.finish_observers();
                self.close_sources().await;
                return Ok(self.report(&state, RunOutcome::AlreadyCompleted, 0, session_start));
            }
            StartingPoint::Resumed(state) | StartingPoint::Fresh(state) => state,
        };
        let collected_at_start = state.statistics.total_collected;

        let outcome = match self.crawl(&mut state).await {
            Ok(RunOutcome::Completed) => self.complete(&mut state),
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(e),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Run {} failed: {}", state.run_id, e);
                state.mark_stopped();
                self.phase = CrawlPhase::Aborted;
                self.finish_observers();
                self.close_sources().await;
                return Err(e);
            }
        };

        if let RunOutcome::Aborted { reason } = &outcome {
            self.abort(&mut state, reason);
        }

        self.finish_observers();
        self.close_sources().await;

        let new_records = state.statistics.total_collected - collected_at_start;
        let report = self.report(&state, outcome, new_records, session_start);
        tracing::info!(
            "Run {} {}: {} collected ({} new), {} duplicates, {} retries, {} errors",
            report.run_id,
            report.outcome,
            report.statistics.total_collected,
            report.new_records,
            report.statistics.skipped_duplicates,
            report.statistics.retries,
            report.statistics.errors
        );
        Ok(report)
    }

    /// The page loop; returns `Completed` when a completion condition is met
    async fn crawl(&mut self, state: &mut CrawlState) -> Result<RunOutcome> {
        // Persist the starting point so the run is visible to the store
        self.transition(CrawlPhase::Checkpointing)?;
        if let Err(reason) = self.checkpoint(state) {
            return Ok(RunOutcome::Aborted { reason });
        }

        // Set once a page of this session advertised a successor
        let mut expect_items = false;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(aborted(AbortReason::Cancelled));
            }

            let page_number = state.progress.current_page;
            if self.params.page_limit_exceeded(page_number) {
                tracing::info!("Reached max_pages ({:?})", self.params.max_pages);
                return Ok(RunOutcome::Completed);
            }
            if self.params.item_limit_reached(state.statistics.total_collected) {
                tracing::info!("Reached max_items ({:?})", self.params.max_items);
                return Ok(RunOutcome::Completed);
            }

            self.transition(CrawlPhase::FetchingList)?;
            let page = match self.fetch_listing(state, page_number).await? {
                Ok(page) => page,
                Err(reason) => return Ok(aborted(reason)),
            };

            if let Some(total) = page.total_pages {
                if state.progress.total_pages != Some(total) {
                    state.set_total_pages(total)?;
                }
            }

            if page.items.is_empty() {
                let within_total = state
                    .progress
                    .total_pages
                    .map_or(false, |total| page_number <= total);
                if expect_items || within_total {
                    tracing::error!("Listing page {} is empty but more pages were advertised", page_number);
                    state.record_error()?;
                    return Ok(aborted(AbortReason::ListingUnreadable {
                        page: page_number,
                        error: "listing page is empty but more pages were advertised".to_string(),
                    }));
                }
                tracing::info!("Listing page {} is empty; nothing left to crawl", page_number);
                return Ok(RunOutcome::Completed);
            }

            tracing::info!(
                "Listing page {}{}: {} items (starting at {})",
                page_number,
                page.total_pages
                    .map(|t| format!("/{}", t))
                    .unwrap_or_default(),
                page.items.len(),
                state.progress.current_index
            );

            self.transition(CrawlPhase::FetchingDetail)?;
            match self.process_items(state, &page).await? {
                PageFlow::Finished => {}
                PageFlow::ItemLimitReached => {
                    tracing::info!("Reached max_items ({:?})", self.params.max_items);
                    return Ok(RunOutcome::Completed);
                }
                PageFlow::Abort(reason) => return Ok(aborted(reason)),
            }

            let has_next = page.has_next_page
                && page.total_pages.map_or(true, |total| page_number < total);

            self.transition(CrawlPhase::Checkpointing)?;
            state.advance_page()?;
            if let Err(reason) = self.checkpoint(state) {
                return Ok(aborted(reason));
            }

            if !has_next {
                tracing::info!("Listing page {} was the last page", page_number);
                return Ok(RunOutcome::Completed);
            }
            expect_items = true;
            if self.params.page_limit_exceeded(state.progress.current_page) {
                continue;
            }

            pause(&self.cancel, self.params.page_delay).await;
        }
    }

    /// Fetches one listing page through the retry policy
    ///
    /// The outer `Result` carries internal errors; the inner one tells the
    /// page loop to abort.
    async fn fetch_listing(
        &mut self,
        state: &mut CrawlState,
        page_number: u32,
    ) -> Result<std::result::Result<ListingPage, AbortReason>> {
        let label = format!("listing page {}", page_number);
        let listing = &self.listing;
        let outcome = run_with_retry(
            &self.params.retry,
            self.params.fetch_timeout,
            &self.cancel,
            &label,
            || listing.fetch_list(page_number),
        )
        .await;

        if outcome.retries() > 0 {
            state.record_retry(outcome.retries())?;
        }

        match outcome {
            RetryOutcome::Success { value, .. } => Ok(Ok(value)),
            RetryOutcome::Exhausted { error, attempts } => {
                tracing::error!(
                    "Listing page {} failed after {} attempts: {}",
                    page_number,
                    attempts,
                    error
                );
                state.record_error()?;
                Ok(Err(AbortReason::ListingUnreadable {
                    page: page_number,
                    error: error.to_string(),
                }))
            }
            RetryOutcome::Cancelled { .. } => Ok(Err(AbortReason::Cancelled)),
        }
    }

    /// Handles the items of one listing page, starting at the cursor index
    async fn process_items(&mut self, state: &mut CrawlState, page: &ListingPage) -> Result<PageFlow> {
        let start_index = state.progress.current_index as usize;
        let last_index = page.items.len().saturating_sub(1);

        for (index, item) in page.items.iter().enumerate().skip(start_index) {
            if self.params.item_limit_reached(state.statistics.total_collected) {
                return Ok(PageFlow::ItemLimitReached);
            }

            if state.is_collected(&item.id) {
                tracing::debug!("Skipping already collected {}", item.id);
                state.record_item(&item.id)?;
                state.set_item_index(index as u32 + 1)?;
                continue;
            }

            if self.cancel.is_cancelled() {
                return Ok(PageFlow::Abort(AbortReason::Cancelled));
            }

            let label = format!("notice {}", item.id);
            let detail = &self.detail;
            let outcome = run_with_retry(
                &self.params.retry,
                self.params.fetch_timeout,
                &self.cancel,
                &label,
                || detail.fetch_detail(item),
            )
            .await;

            if outcome.retries() > 0 {
                state.record_retry(outcome.retries())?;
            }

            match outcome {
                RetryOutcome::Success { value, .. } => {
                    state.record_item(&item.id)?;
                    tracing::debug!("Collected {}", item.id);
                    self.notify_observers(&value);
                }
                RetryOutcome::Exhausted { error, .. } if error.kind.is_fatal() => {
                    tracing::error!("Fatal error on {}: {}", item.id, error);
                    return Ok(PageFlow::Abort(AbortReason::DetailFatal {
                        id: item.id.clone(),
                        error: error.to_string(),
                    }));
                }
                RetryOutcome::Exhausted { error, attempts } => {
                    tracing::warn!("Giving up on {} after {} attempts: {}", item.id, attempts, error);
                    state.record_failure(item.identifying_info(), error.to_string(), attempts)?;
                }
                RetryOutcome::Cancelled { .. } => {
                    // Left unrecorded so the item is fetched again on resume
                    return Ok(PageFlow::Abort(AbortReason::Cancelled));
                }
            }

            state.set_item_index(index as u32 + 1)?;

            if index < last_index {
                pause(&self.cancel, self.params.item_delay).await;
            }
        }

        Ok(PageFlow::Finished)
    }

    /// Marks the state completed and persists it
    ///
    /// The final save is retried until it succeeds or the consecutive
    /// failure threshold is reached.
    fn complete(&mut self, state: &mut CrawlState) -> Result<RunOutcome> {
        self.transition(CrawlPhase::Checkpointing)?;
        state.mark_completed()?;

        loop {
            match self.checkpoint(state) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(reason) => return Ok(aborted(reason)),
            }
        }

        self.transition(CrawlPhase::Completed)?;
        Ok(RunOutcome::Completed)
    }

    /// Stops the run, keeping the last checkpoint as the resume point
    fn abort(&mut self, state: &mut CrawlState, reason: &AbortReason) {
        tracing::error!("Aborting run {}: {}", state.run_id, reason);
        state.mark_stopped();

        if !matches!(reason, AbortReason::PersistenceExhausted { .. }) {
            if let Err(e) = self.store.save(state) {
                tracing::error!("Could not save state of aborted run {}: {}", state.run_id, e);
            }
        }

        self.phase = CrawlPhase::Aborted;
    }

    /// Saves `state`, tracking consecutive failures
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The state was saved
    /// * `Ok(false)` - The save failed but the threshold is not reached yet
    /// * `Err(AbortReason)` - Too many consecutive failures; the run must abort
    fn checkpoint(&mut self, state: &CrawlState) -> std::result::Result<bool, AbortReason> {
        match self.store.save(state) {
            Ok(()) => {
                self.checkpoint_failures = 0;
                tracing::debug!(
                    "Checkpoint: page {}, index {}",
                    state.progress.current_page,
                    state.progress.current_index
                );
                Ok(true)
            }
            Err(e) => {
                self.checkpoint_failures += 1;
                tracing::warn!(
                    "Checkpoint failed ({}/{}): {}",
                    self.checkpoint_failures,
                    self.params.max_checkpoint_failures,
                    e
                );
                if self.checkpoint_failures >= self.params.max_checkpoint_failures {
                    return Err(AbortReason::PersistenceExhausted {
                        failures: self.checkpoint_failures,
                        error: e.to_string(),
                    });
                }
                Ok(false)
            }
        }
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        if self.phase != next {
            tracing::trace!("Phase {} -> {}", self.phase, next);
            self.phase = next;
        }
        Ok(())
    }

    fn notify_observers(&mut self, record: &DetailRecord) {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_item_collected(record) {
                tracing::warn!("Observer failed on {}: {}", record.id, e);
            }
        }
    }

    fn finish_observers(&mut self) {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_run_finished() {
                tracing::warn!("Observer failed to finish: {}", e);
            }
        }
    }

    async fn close_sources(&mut self) {
        self.listing.close().await;
        self.detail.close().await;
    }

    fn report(
        &self,
        state: &CrawlState,
        outcome: RunOutcome,
        new_records: u64,
        session_start: Instant,
    ) -> CrawlReport {
        CrawlReport {
            run_id: state.run_id.clone(),
            outcome,
            statistics: state.statistics.clone(),
            progress: state.progress.clone(),
            failed_items: state.failed_items.clone(),
            new_records,
            started_at: state.started_at,
            finished_at: Utc::now(),
            elapsed: session_start.elapsed(),
        }
    }
}

fn aborted(reason: AbortReason) -> RunOutcome {
    RunOutcome::Aborted { reason }
}

/// Sleeps for `delay` unless the stop signal fires first
async fn pause(cancel: &CancellationToken, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}
