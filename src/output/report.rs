//! Human-readable run summaries
//!
//! `print_report` is shown at the end of a crawl; `print_state_summary`
//! backs the `--stats` mode and reads straight from a stored state.

use crate::crawler::CrawlReport;
use crate::state::{CrawlState, FailedItem, RunStatistics};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Failure reasons with their counts, most frequent first
pub fn failure_reasons(failed: &[FailedItem]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in failed {
        *counts.entry(item.error.as_str()).or_default() += 1;
    }

    let mut reasons: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(reason, count)| (reason.to_string(), count))
        .collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    reasons
}

fn write_statistics(out: &mut String, stats: &RunStatistics) {
    let _ = writeln!(out, "Records:");
    let _ = writeln!(out, "  Collected: {}", stats.total_collected);
    let _ = writeln!(out, "  Duplicates skipped: {}", stats.skipped_duplicates);
    let _ = writeln!(out, "  Retries: {}", stats.retries);
    let _ = writeln!(out, "  Errors: {}", stats.errors);
    let _ = writeln!(out, "  Success rate: {:.1}%", stats.success_rate());
    let _ = writeln!(out);
}

fn write_failures(out: &mut String, failed: &[FailedItem]) {
    if failed.is_empty() {
        return;
    }

    let _ = writeln!(out, "Failure Reasons:");
    for (reason, count) in failure_reasons(failed) {
        let _ = writeln!(out, "  {}: {}", reason, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Failed Items ({}):", failed.len());
    for item in failed {
        let id = item.info.get("id").map(String::as_str).unwrap_or("?");
        let _ = writeln!(out, "  - {} ({} attempts): {}", id, item.attempts, item.error);
    }
    let _ = writeln!(out);
}

/// Renders the final report of a run
pub fn format_report(report: &CrawlReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Report: {} ===\n", report.run_id);
    let _ = writeln!(out, "Outcome: {}", report.outcome);
    let _ = writeln!(
        out,
        "Progress: page {}, item {} (last completed page {})",
        report.progress.current_page, report.progress.current_index, report.progress.last_completed_page
    );
    if let Some(total) = report.progress.total_pages {
        let _ = writeln!(out, "Total pages: {}", total);
    }
    let _ = writeln!(
        out,
        "This session: {} new records in {:.1}s",
        report.new_records,
        report.elapsed.as_secs_f64()
    );
    let _ = writeln!(out);

    write_statistics(&mut out, &report.statistics);
    write_failures(&mut out, &report.failed_items);
    out
}

/// Prints the final report of a run to stdout
pub fn print_report(report: &CrawlReport) {
    print!("{}", format_report(report));
}

/// Renders a stored state
pub fn format_state_summary(state: &CrawlState) -> String {
    let status = if state.is_completed {
        "completed"
    } else if state.is_running {
        "running (or interrupted)"
    } else {
        "stopped"
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== Run {} ===\n", state.run_id);
    let _ = writeln!(out, "Status: {}", status);
    let _ = writeln!(out, "Started: {}", state.started_at.to_rfc3339());
    let _ = writeln!(out, "Last update: {}", state.last_updated_at.to_rfc3339());
    let _ = writeln!(
        out,
        "Resume point: page {}, item {}",
        state.progress.current_page, state.progress.current_index
    );
    let _ = writeln!(out);

    write_statistics(&mut out, &state.statistics);
    write_failures(&mut out, &state.failed_items);
    out
}

/// Prints a stored state to stdout
pub fn print_state_summary(state: &CrawlState) {
    print!("{}", format_state_summary(state));
}
