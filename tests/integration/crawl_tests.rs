//! Integration tests for the crawler
//!
//! Most tests drive the coordinator with in-process fake fetchers and an
//! in-memory state store. The last ones use wiremock to run the full HTTP
//! crawl end-to-end.

use async_trait::async_trait;
use bid_crawler::config::parse_config;
use bid_crawler::crawler::{
    run_crawl, AbortReason, Coordinator, CrawlOptions, CrawlReport, RunOutcome, RunParameters,
};
use bid_crawler::output::OutputResult;
use bid_crawler::retry::{ErrorKind, RetryPolicy};
use bid_crawler::scrape::{
    DetailRecord, DetailSource, FetchError, FetchResult, ListingItem, ListingPage, ListingSource,
};
use bid_crawler::state::CrawlState;
use bid_crawler::storage::{JsonStateStore, StateStore, StorageError, StorageResult};
use bid_crawler::CrawlError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===== Fakes =====

/// A paginated site held in memory
#[derive(Clone, Default)]
struct FakeSite {
    pages: Vec<Vec<String>>,
    list_failures: HashMap<u32, FetchError>,
    detail_failures: HashMap<String, FetchError>,
    detail_calls: Arc<Mutex<Vec<String>>>,
    list_calls: Arc<Mutex<Vec<u32>>>,
    closed: Arc<AtomicU32>,
    /// Cancel this token once the given number of detail fetches completed
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeSite {
    fn new(pages: &[&[&str]]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|ids| ids.iter().map(|id| id.to_string()).collect())
                .collect(),
            ..Default::default()
        }
    }

    fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    fn calls_for(&self, id: &str) -> usize {
        self.detail_calls().iter().filter(|c| c.as_str() == id).count()
    }

    fn all_ids(&self) -> BTreeSet<String> {
        self.pages.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl ListingSource for FakeSite {
    async fn fetch_list(&self, page: u32) -> FetchResult<ListingPage> {
        self.list_calls.lock().unwrap().push(page);
        if let Some(error) = self.list_failures.get(&page) {
            return Err(error.clone());
        }

        let Some(ids) = self.pages.get(page as usize - 1) else {
            return Ok(ListingPage::default());
        };

        let items = ids
            .iter()
            .map(|id| {
                let mut item = ListingItem::new(id.clone());
                item.title = Some(format!("Notice {}", id));
                item
            })
            .collect();

        Ok(ListingPage {
            items,
            has_next_page: (page as usize) < self.pages.len(),
            total_pages: Some(self.pages.len() as u32),
        })
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetailSource for FakeSite {
    async fn fetch_detail(&self, item: &ListingItem) -> FetchResult<DetailRecord> {
        let calls = {
            let mut calls = self.detail_calls.lock().unwrap();
            calls.push(item.id.clone());
            calls.len()
        };

        if let Some(error) = self.detail_failures.get(&item.id) {
            return Err(error.clone());
        }

        if let Some((limit, token)) = &self.cancel_after {
            if calls >= *limit {
                token.cancel();
            }
        }

        let fields = BTreeMap::from([("agency".to_string(), format!("Agency of {}", item.id))]);
        Ok(DetailRecord::new(item.clone(), fields))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryInner {
    states: HashMap<String, CrawlState>,
    history: Vec<CrawlState>,
    failing_saves: u32,
}

/// State store kept in memory, recording every successful save
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    fn failing(saves: u32) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().failing_saves = saves;
        store
    }

    fn history(&self) -> Vec<CrawlState> {
        self.inner.lock().unwrap().history.clone()
    }

    fn stored(&self, run_id: &str) -> Option<CrawlState> {
        self.inner.lock().unwrap().states.get(run_id).cloned()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, run_id: &str) -> StorageResult<Option<CrawlState>> {
        Ok(self.stored(run_id))
    }

    fn save(&mut self, state: &CrawlState) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_saves > 0 {
            inner.failing_saves -= 1;
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        inner.states.insert(state.run_id.clone(), state.clone());
        inner.history.push(state.clone());
        Ok(())
    }

    fn latest_incomplete_run(&self) -> StorageResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .states
            .values()
            .filter(|s| !s.is_completed)
            .max_by_key(|s| s.last_updated_at)
            .map(|s| s.run_id.clone()))
    }

    fn remove(&mut self, run_id: &str) -> StorageResult<()> {
        self.inner.lock().unwrap().states.remove(run_id);
        Ok(())
    }
}

// ===== Helpers =====

fn create_test_params(run_id: &str) -> RunParameters {
    let mut params = RunParameters::new(run_id);
    params.retry = RetryPolicy::new(3, 0.001, 0.005);
    params.fetch_timeout = Duration::from_secs(5);
    params
}

fn three_pages() -> FakeSite {
    FakeSite::new(&[&["A1", "A2", "A3"], &["B1", "B2", "B3"], &["C1", "C2", "C3"]])
}

async fn run_once<S: StateStore>(
    site: &FakeSite,
    store: S,
    params: RunParameters,
) -> (CrawlReport, Vec<String>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();

    let mut coordinator = Coordinator::new(site.clone(), site.clone(), store, params);
    if let Some((_, token)) = &site.cancel_after {
        coordinator = coordinator.with_cancellation(token.clone());
    }
    coordinator.add_observer(move |record: &DetailRecord| -> OutputResult<()> {
        observed.lock().unwrap().push(record.id.clone());
        Ok(())
    });

    let report = coordinator.run().await.unwrap();
    let seen = seen.lock().unwrap().clone();
    (report, seen)
}

fn collected(state: &CrawlState) -> BTreeSet<String> {
    state.collected_ids.iter().map(str::to_string).collect()
}

// ===== Orchestrator behavior =====

#[tokio::test]
async fn test_full_run_collects_every_item() {
    let site = three_pages();
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.statistics.total_collected, 9);
    assert_eq!(report.new_records, 9);
    assert_eq!(
        seen,
        vec!["A1", "A2", "A3", "B1", "B2", "B3", "C1", "C2", "C3"]
    );

    let stored = store.stored("run-1").unwrap();
    assert!(stored.is_completed);
    assert!(!stored.is_running);
    assert_eq!(collected(&stored), site.all_ids());
    assert_eq!(stored.progress.total_pages, Some(3));
    assert_eq!(stored.progress.last_completed_page, 3);
    assert_eq!(site.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    // Reference run
    let reference_site = three_pages();
    let (reference, _) = run_once(
        &reference_site,
        MemoryStore::default(),
        create_test_params("ref"),
    )
    .await;
    assert_eq!(reference.outcome, RunOutcome::Completed);

    // Interrupted run: stop once the 4th detail fetch (B1) finished
    let dir = TempDir::new().unwrap();
    let mut interrupted_site = three_pages();
    interrupted_site.cancel_after = Some((4, CancellationToken::new()));

    let store = JsonStateStore::new(dir.path()).unwrap();
    let (first, first_seen) =
        run_once(&interrupted_site, store, create_test_params("run-1")).await;

    assert_eq!(
        first.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::Cancelled
        }
    );
    assert_eq!(first_seen, vec!["A1", "A2", "A3", "B1"]);

    let saved = JsonStateStore::new(dir.path())
        .unwrap()
        .load("run-1")
        .unwrap()
        .unwrap();
    assert!(!saved.is_running);
    assert_eq!(saved.progress.current_page, 2);
    assert_eq!(saved.progress.current_index, 1);

    // Resumed run on a fresh process
    let resumed_site = three_pages();
    let store = JsonStateStore::new(dir.path()).unwrap();
    let (second, second_seen) = run_once(&resumed_site, store, create_test_params("run-1")).await;

    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second_seen, vec!["B2", "B3", "C1", "C2", "C3"]);
    assert_eq!(second.new_records, 5);

    // No item collected before the interruption is fetched again
    for id in &first_seen {
        assert_eq!(resumed_site.calls_for(id), 0, "{} was fetched again", id);
    }

    let final_state = JsonStateStore::new(dir.path())
        .unwrap()
        .load("run-1")
        .unwrap()
        .unwrap();
    assert!(final_state.is_completed);
    assert_eq!(collected(&final_state), reference_site.all_ids());
    assert_eq!(
        final_state.statistics.total_collected,
        reference.statistics.total_collected
    );
    assert_eq!(final_state.started_at, saved.started_at);
}

#[tokio::test]
async fn test_duplicate_ids_are_fetched_once() {
    let site = FakeSite::new(&[&["A1", "A2"], &["A2", "B1"]]);
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store, create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seen, vec!["A1", "A2", "B1"]);
    assert_eq!(site.calls_for("A2"), 1);
    assert_eq!(report.statistics.total_collected, 3);
    assert_eq!(report.statistics.skipped_duplicates, 1);
}

#[tokio::test]
async fn test_repeated_page_only_counts_duplicates() {
    let site = FakeSite::new(&[&["A1", "A2", "A3"], &["A1", "A2", "A3"]]);
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store.clone(), create_test_params("run-1")).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seen, vec!["A1", "A2", "A3"]);
    assert_eq!(site.detail_calls().len(), 3);

    // Checkpoints taken after the first and the second pass over the page
    let history = store.history();
    let after_first = history
        .iter()
        .find(|s| s.progress.last_completed_page == 1)
        .unwrap();
    let after_second = history
        .iter()
        .find(|s| s.progress.last_completed_page == 2)
        .unwrap();

    assert_eq!(after_first.statistics.skipped_duplicates, 0);
    assert_eq!(after_second.statistics.skipped_duplicates, 3);
    assert_eq!(collected(after_second), collected(after_first));
    assert_eq!(
        after_second.statistics.total_collected,
        after_first.statistics.total_collected
    );
}

#[tokio::test]
async fn test_empty_page_after_next_link_aborts() {
    let site = FakeSite::new(&[&["A1", "A2"], &[]]);
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::ListingUnreadable { page: 2, .. }
        }
    ));
    assert_eq!(seen, vec!["A1", "A2"]);

    let stored = store.stored("run-1").unwrap();
    assert!(!stored.is_completed);
    assert_eq!(stored.progress.current_page, 2);
    assert_eq!(stored.statistics.errors, 1);
}

#[tokio::test]
async fn test_always_transient_item_is_attempted_max_retries_times() {
    let mut site = FakeSite::new(&[&["A1", "A2", "A3"]]);
    site.detail_failures
        .insert("A2".to_string(), FetchError::transient("HTTP 503"));
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store, create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(site.calls_for("A2"), 3);
    assert_eq!(seen, vec!["A1", "A3"]);

    assert_eq!(report.failed_items.len(), 1);
    let failed = &report.failed_items[0];
    assert_eq!(failed.info["id"], "A2");
    assert_eq!(failed.info["title"], "Notice A2");
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.error, "HTTP 503");

    assert_eq!(report.statistics.retries, 2);
    assert_eq!(report.statistics.errors, 1);
    assert_eq!(report.statistics.total_collected, 2);
}

#[tokio::test]
async fn test_permanent_item_failure_is_not_retried() {
    let mut site = FakeSite::new(&[&["A1", "A2"]]);
    site.detail_failures
        .insert("A1".to_string(), FetchError::permanent("HTTP 404"));

    let (report, seen) = run_once(&site, MemoryStore::default(), create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(site.calls_for("A1"), 1);
    assert_eq!(seen, vec!["A2"]);
    assert_eq!(report.failed_items[0].attempts, 1);
    assert_eq!(report.statistics.retries, 0);
}

#[tokio::test]
async fn test_statistics_only_grow_across_checkpoints() {
    let mut site = FakeSite::new(&[&["A1", "A2", "A3"], &["A3", "B1", "B2"], &["C1"]]);
    site.detail_failures
        .insert("B1".to_string(), FetchError::transient("timed out"));
    site.detail_failures
        .insert("C1".to_string(), FetchError::permanent("HTTP 410"));
    let store = MemoryStore::default();

    let (report, _) = run_once(&site, store.clone(), create_test_params("run-1")).await;
    assert_eq!(report.outcome, RunOutcome::Completed);

    let history = store.history();
    assert!(history.len() >= 4);
    for pair in history.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(later.statistics.dominates(&earlier.statistics));
        assert!(collected(later).is_superset(&collected(earlier)));
        assert!(later.failed_items.starts_with(&earlier.failed_items));
        assert!(later.last_updated_at >= earlier.last_updated_at);
    }
}

#[tokio::test]
async fn test_repeated_checkpoint_failures_abort_the_run() {
    let site = three_pages();
    let store = MemoryStore::failing(u32::MAX);

    let (report, _) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    match &report.outcome {
        RunOutcome::Aborted {
            reason: AbortReason::PersistenceExhausted { failures, .. },
        } => assert_eq!(*failures, 3),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(store.stored("run-1").is_none());
    assert_eq!(site.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_isolated_checkpoint_failures_are_tolerated() {
    let site = three_pages();
    let store = MemoryStore::failing(2);

    let (report, _) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(store.stored("run-1").unwrap().is_completed);
}

#[tokio::test]
async fn test_completed_run_is_not_crawled_again() {
    let site = three_pages();
    let store = MemoryStore::default();
    run_once(&site, store.clone(), create_test_params("run-1")).await;
    let calls_after_first = site.detail_calls().len();

    let (report, seen) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::AlreadyCompleted);
    assert!(seen.is_empty());
    assert_eq!(site.detail_calls().len(), calls_after_first);
    assert_eq!(report.statistics.total_collected, 9);
    assert_eq!(report.new_records, 0);
}

#[tokio::test]
async fn test_fresh_run_ignores_stored_state() {
    let site = three_pages();
    let store = MemoryStore::default();
    run_once(&site, store.clone(), create_test_params("run-1")).await;

    let mut params = create_test_params("run-1");
    params.resume = false;
    let (report, seen) = run_once(&site, store, params).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seen.len(), 9);
}

#[tokio::test]
async fn test_unreadable_listing_aborts_and_keeps_checkpoint() {
    let mut site = three_pages();
    site.list_failures
        .insert(2, FetchError::transient("connection reset"));
    let store = MemoryStore::default();

    let (report, seen) = run_once(&site, store.clone(), create_test_params("run-1")).await;

    match &report.outcome {
        RunOutcome::Aborted {
            reason: AbortReason::ListingUnreadable { page, error },
        } => {
            assert_eq!(*page, 2);
            assert_eq!(error, "connection reset");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(seen, vec!["A1", "A2", "A3"]);

    let list_calls = site.list_calls.lock().unwrap().clone();
    assert_eq!(list_calls.iter().filter(|p| **p == 2).count(), 3);

    let stored = store.stored("run-1").unwrap();
    assert!(!stored.is_completed);
    assert!(!stored.is_running);
    assert_eq!(stored.progress.current_page, 2);
    assert_eq!(stored.statistics.errors, 1);
    assert_eq!(stored.statistics.retries, 2);
}

#[tokio::test]
async fn test_fatal_detail_error_aborts_and_item_is_retried_on_resume() {
    let mut site = FakeSite::new(&[&["A1", "A2", "A3"]]);
    site.detail_failures
        .insert("A2".to_string(), FetchError::fatal("session expired"));
    let store = MemoryStore::default();

    let (report, _) = run_once(&site, store.clone(), create_test_params("run-1")).await;
    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::DetailFatal { .. }
        }
    ));
    assert_eq!(site.calls_for("A2"), 1);
    assert!(report.failed_items.is_empty());

    let healthy = FakeSite::new(&[&["A1", "A2", "A3"]]);
    let (resumed, seen) = run_once(&healthy, store, create_test_params("run-1")).await;
    assert_eq!(resumed.outcome, RunOutcome::Completed);
    assert_eq!(seen, vec!["A2", "A3"]);
}

#[tokio::test]
async fn test_max_items_completes_mid_page() {
    let site = three_pages();
    let store = MemoryStore::default();
    let mut params = create_test_params("run-1");
    params.max_items = Some(4);

    let (report, seen) = run_once(&site, store.clone(), params).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seen, vec!["A1", "A2", "A3", "B1"]);
    assert!(store.stored("run-1").unwrap().is_completed);
}

#[tokio::test]
async fn test_max_pages_limits_listing_fetches() {
    let site = three_pages();
    let mut params = create_test_params("run-1");
    params.max_pages = Some(2);

    let (report, seen) = run_once(&site, MemoryStore::default(), params).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seen.len(), 6);
    assert_eq!(site.list_calls.lock().unwrap().clone(), vec![1, 2]);
}

#[tokio::test]
async fn test_empty_first_page_completes_immediately() {
    let site = FakeSite::new(&[]);
    let (report, seen) = run_once(&site, MemoryStore::default(), create_test_params("run-1")).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(seen.is_empty());
    assert_eq!(report.statistics.total_collected, 0);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let mut site = FakeSite::new(&[&["A1", "A2"]]);
    site.detail_failures
        .insert("A1".to_string(), FetchError::transient("HTTP 503"));
    let store = MemoryStore::default();

    let mut params = create_test_params("run-1");
    params.retry = RetryPolicy::new(5, 30.0, 60.0);

    let token = CancellationToken::new();
    let mut coordinator = Coordinator::new(site.clone(), site.clone(), store.clone(), params)
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("backoff was not interrupted")
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::Cancelled
        }
    );
    assert_eq!(site.calls_for("A1"), 1);
    assert_eq!(site.calls_for("A2"), 0);

    // The interrupted item is neither collected nor failed
    let stored = store.stored("run-1").unwrap();
    assert!(stored.failed_items.is_empty());
    assert!(!stored.is_collected("A1"));
    assert_eq!(stored.progress.current_index, 0);
}

#[tokio::test]
async fn test_observer_errors_do_not_stop_the_crawl() {
    let site = FakeSite::new(&[&["A1", "A2"]]);
    let mut coordinator = Coordinator::new(
        site.clone(),
        site.clone(),
        MemoryStore::default(),
        create_test_params("run-1"),
    );
    coordinator.add_observer(|_: &DetailRecord| -> OutputResult<()> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "sink unavailable").into())
    });

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.statistics.total_collected, 2);
}

#[tokio::test]
async fn test_corrupt_state_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("run-1.json"), b"{ not json").unwrap();

    let site = three_pages();
    let store = JsonStateStore::new(dir.path()).unwrap();
    let mut coordinator =
        Coordinator::new(site.clone(), site.clone(), store, create_test_params("run-1"));

    let result = coordinator.run().await;
    assert!(matches!(result, Err(CrawlError::Storage(_))));
    assert!(site.detail_calls().is_empty());
}

#[test]
fn test_error_kind_classification_is_carried() {
    assert_eq!(FetchError::transient("x").kind, ErrorKind::Transient);
}

// ===== Full HTTP crawl =====

fn create_test_config(server_uri: &str, state_dir: &str, output_path: &str) -> String {
    format!(
        r#"
[crawler]
page-delay-ms = 0
item-delay-ms = 0
fetch-timeout-ms = 5000

[retry]
max-retries = 2
base-delay = 0.01
max-delay = 0.02

[site]
base-url = "{uri}"
list-url = "{uri}/notices?page={{page}}"
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
state-dir = "{state_dir}"
output-path = "{output_path}"
"#,
        uri = server_uri,
        state_dir = state_dir,
        output_path = output_path,
    )
}

fn listing_html(ids: &[&str], has_next: bool) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td class="notice-no">{id}</td><td class="title"><a href="/notice/{id}">Notice {id}</a></td></tr>"#,
                id = id
            )
        })
        .collect();
    let next = if has_next {
        r##"<a class="next" href="#">Next</a>"##
    } else {
        ""
    };
    format!(
        r#"<html><body><table class="notices"><tbody>{}</tbody></table>{}</body></html>"#,
        rows, next
    )
}

async fn mount_site(server: &MockServer, robots: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(robots))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notices"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["N-1", "N-2"], true)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notices"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["N-3"], false)))
        .mount(server)
        .await;

    for id in ["N-1", "N-3"] {
        Mock::given(method("GET"))
            .and(path(format!("/notice/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<dl><dd class="agency">Agency {id}</dd><dd class="deadline">2024-06-30</dd></dl>"#,
                id = id
            )))
            .mount(server)
            .await;
    }

    // N-2 is gone
    Mock::given(method("GET"))
        .and(path("/notice/N-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_http_crawl() {
    let server = MockServer::start().await;
    mount_site(&server, "User-agent: *\nAllow: /\n").await;

    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    let output_path = dir.path().join("records.jsonl");
    let config = parse_config(&create_test_config(
        &server.uri(),
        state_dir.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ))
    .unwrap();

    let options = CrawlOptions {
        run_id: Some("http-run".to_string()),
        resume: true,
        cancel: CancellationToken::new(),
    };
    let report = run_crawl(&config, options).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.statistics.total_collected, 2);
    assert_eq!(report.statistics.errors, 1);
    assert_eq!(report.failed_items[0].info["id"], "N-2");
    assert_eq!(report.failed_items[0].error, "HTTP 404");

    let output = std::fs::read_to_string(&output_path).unwrap();
    let records: Vec<DetailRecord> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "N-1");
    assert_eq!(records[0].fields["agency"], "Agency N-1");
    assert_eq!(records[1].id, "N-3");

    let stored = JsonStateStore::new(&state_dir)
        .unwrap()
        .load("http-run")
        .unwrap()
        .unwrap();
    assert!(stored.is_completed);
}

#[tokio::test]
async fn test_both_output_writes_jsonl_and_csv() {
    let server = MockServer::start().await;
    mount_site(&server, "User-agent: *\nAllow: /\n").await;

    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    let output_path = dir.path().join("records.jsonl");
    let mut toml = create_test_config(
        &server.uri(),
        state_dir.to_str().unwrap(),
        output_path.to_str().unwrap(),
    );
    toml.push_str("output-format = \"both\"\n");
    let config = parse_config(&toml).unwrap();

    let options = CrawlOptions {
        run_id: Some("both-run".to_string()),
        resume: true,
        cancel: CancellationToken::new(),
    };
    let report = run_crawl(&config, options).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let jsonl = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(jsonl.lines().count(), 2);

    let csv = std::fs::read_to_string(dir.path().join("records.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id,title,detail_url,fetched_at,agency,deadline");
    assert!(lines[1].starts_with("N-1,Notice N-1,"));
    assert!(lines[1].ends_with(",Agency N-1,2024-06-30"));
    assert!(lines[2].starts_with("N-3,Notice N-3,"));
}

#[tokio::test]
async fn test_unreadable_http_listing_aborts_and_can_resume() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notices"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&["N-1"], true)))
        .mount(&server)
        .await;

    // Markup changed: rows are there but the notice number cell is not
    let changed = listing_html(&["N-2"], true).replace("notice-no", "no");
    Mock::given(method("GET"))
        .and(path("/notices"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(changed))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notice/N-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"<dl><dd class="agency">Agency N-1</dd></dl>"#),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    let output_path = dir.path().join("records.jsonl");
    let config = parse_config(&create_test_config(
        &server.uri(),
        state_dir.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ))
    .unwrap();

    let options = CrawlOptions {
        run_id: Some("changed-markup".to_string()),
        resume: true,
        cancel: CancellationToken::new(),
    };
    let report = run_crawl(&config, options).await.unwrap();

    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::ListingUnreadable { page: 2, .. }
        }
    ));
    assert_eq!(report.statistics.total_collected, 1);
    assert_eq!(report.statistics.errors, 1);

    let stored = JsonStateStore::new(&state_dir)
        .unwrap()
        .load("changed-markup")
        .unwrap()
        .unwrap();
    assert!(!stored.is_completed);
    assert_eq!(stored.progress.current_page, 2);
}

#[tokio::test]
async fn test_robots_disallow_refuses_to_start() {
    let server = MockServer::start().await;
    mount_site(&server, "User-agent: BidCrawler\nDisallow: /notices\n").await;

    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    let output_path = dir.path().join("records.jsonl");
    let config = parse_config(&create_test_config(
        &server.uri(),
        state_dir.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ))
    .unwrap();

    let options = CrawlOptions {
        run_id: Some("blocked".to_string()),
        resume: true,
        cancel: CancellationToken::new(),
    };
    let result = run_crawl(&config, options).await;

    assert!(matches!(result, Err(CrawlError::Robots { .. })));
    assert!(!output_path.exists());
}
