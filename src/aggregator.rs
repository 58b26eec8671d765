//! Run every selected source and merge the results into one table.
//!
//! Sources are crawled either concurrently (one spawned task per source) or
//! one after another. Nothing is shared between crawls except the read-only
//! [`RunContext`]; merging happens after every task has been joined.
//! Cancellation is cooperative: a source that has not started when the flag
//! is raised is reported as aborted, and one already running stops before its
//! next result page.

use crate::context::{CANCELLED, RunContext};
use crate::crawler::{CrawlOutcome, crawl};
use crate::fetch::Fetch;
use crate::models::{RunResult, Source, SourceReport, SourceStatus, TransactionRecord};
use crate::recency::cutoff_for;
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, instrument, warn};

/// Parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub query: String,
    pub days: u32,
    pub cutoff: NaiveDate,
    pub max_pages: u32,
    pub concurrent: bool,
}

impl RunRequest {
    pub fn new(query: &str, days: u32, max_pages: u32, concurrent: bool, today: NaiveDate) -> Self {
        Self {
            query: query.to_string(),
            days,
            cutoff: cutoff_for(today, days),
            max_pages,
            concurrent,
        }
    }
}

/// Crawl `sources` and merge their records.
#[instrument(
    level = "info",
    skip_all,
    fields(query = %request.query, days = request.days, max_pages = request.max_pages, concurrent = request.concurrent)
)]
pub async fn run<F: Fetch + 'static>(
    ctx: &Arc<RunContext<F>>,
    sources: &[Source],
    request: &RunRequest,
) -> RunResult {
    let started_at = Local::now();
    let t0 = Instant::now();
    let sources: Vec<Source> = sources.iter().copied().unique().collect();
    info!(count = sources.len(), cutoff = %request.cutoff, "Starting run");

    let outcomes = if request.concurrent {
        let handles = sources.iter().map(|&source| {
            let ctx = Arc::clone(ctx);
            let request = request.clone();
            tokio::spawn(async move { run_source(&ctx, source, &request).await }.in_current_span())
        });
        join_all(handles)
            .await
            .into_iter()
            .zip(&sources)
            .map(|(joined, &source)| {
                joined.unwrap_or_else(|e| {
                    error!(%source, error = %e, "Crawl task failed");
                    not_run(source, SourceStatus::Errored {
                        reason: format!("crawl task failed: {e}"),
                    })
                })
            })
            .collect()
    } else {
        let mut outcomes = Vec::with_capacity(sources.len());
        for &source in &sources {
            outcomes.push(run_source(ctx, source, request).await);
        }
        outcomes
    };

    let (records, per_source_status) = merge(outcomes);
    let duration = t0.elapsed();
    info!(
        records = records.len(),
        completed = per_source_status.values().filter(|r| r.status == SourceStatus::Completed).count(),
        elapsed_ms = duration.as_millis() as u64,
        "Run finished"
    );

    RunResult {
        query: request.query.clone(),
        days: request.days,
        records,
        per_source_status,
        started_at,
        duration,
    }
}

/// Convenience entry point: cutoff computed from today's local date.
pub async fn run_extraction<F: Fetch + 'static>(
    ctx: &Arc<RunContext<F>>,
    sources: &[Source],
    query: &str,
    days: u32,
    max_pages: u32,
    parallel: bool,
) -> RunResult {
    let today = Local::now().date_naive();
    let request = RunRequest::new(query, days, max_pages, parallel, today);
    run(ctx, sources, &request).await
}

async fn run_source<F: Fetch>(ctx: &RunContext<F>, source: Source, request: &RunRequest) -> CrawlOutcome {
    if ctx.cancel.is_cancelled() {
        warn!(%source, "Run cancelled before source started");
        return not_run(source, SourceStatus::Aborted {
            reason: CANCELLED.to_string(),
        });
    }
    crawl(ctx, source, &request.query, request.cutoff, request.max_pages).await
}

/// Outcome for a source whose crawl never produced one.
fn not_run(source: Source, status: SourceStatus) -> CrawlOutcome {
    CrawlOutcome {
        records: Vec::new(),
        report: SourceReport {
            source,
            status,
            pages_fetched: 0,
            records: 0,
            articles_skipped: 0,
            authenticated: None,
        },
    }
}

/// Concatenate records in source order, keeping the first record per URL.
pub(crate) fn merge(
    outcomes: Vec<CrawlOutcome>,
) -> (Vec<TransactionRecord>, BTreeMap<Source, SourceReport>) {
    let mut reports = BTreeMap::new();
    let mut all = Vec::new();
    for outcome in outcomes {
        reports.insert(outcome.report.source, outcome.report);
        all.extend(outcome.records);
    }
    let before = all.len();
    let records: Vec<TransactionRecord> = all.into_iter().unique_by(|r| r.url.clone()).collect();
    if records.len() < before {
        info!(dropped = before - records.len(), "Dropped duplicate URLs");
    }
    (records, reports)
}
