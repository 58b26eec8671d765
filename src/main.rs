//! # M&A News Extractor
//!
//! Crawls Brazilian business news sites for mergers-and-acquisitions
//! coverage, pulls the deal fields out of each article with pattern matching,
//! and writes the results to a spreadsheet plus a run history.
//!
//! ## Features
//!
//! - Searches Pipeline Valor, Valor Econômico (with optional login) and
//!   Fusões e Aquisições
//! - Keeps only articles published within the last N days
//! - Extracts acquirer, acquired company, deal value and valuation multiple
//! - Writes `ma_noticias_<timestamp>.csv` and appends to
//!   `extraction_history.json`
//!
//! ## Usage
//!
//! ```sh
//! ma_news_extractor run --days 7 --max-pages 2
//! ma_news_extractor history
//! ```
//!
//! ## Architecture
//!
//! 1. **Crawling**: one crawl per source, concurrently unless `--sequential`
//! 2. **Filtering**: result pages are read until an item predates the cutoff
//! 3. **Extraction**: each article's title and body run through ordered
//!    pattern lists
//! 4. **Output**: merged, de-duplicated records go to CSV; the run is logged
//!    to the history file

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod cli;
mod config;
mod context;
mod crawler;
mod credentials;
mod error;
mod extract;
mod fetch;
mod models;
mod outputs;
mod recency;
mod sources;
mod utils;

use aggregator::run_extraction;
use cli::{Cli, Command, HistoryArgs, RunArgs};
use config::ExtractorConfig;
use context::{CancelFlag, RunContext};
use credentials::CredentialSnapshot;
use fetch::HttpFetcher;
use models::{Source, SourceStatus};
use outputs::history::{self, RunRecord};
use outputs::spreadsheet;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "ma_news_extractor starting up");

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await?,
        Command::History(args) => show_history(args).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = ExtractorConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    debug!(
        query = %config.query,
        days = config.days,
        max_pages = config.max_pages,
        parallel = config.parallel,
        sources = ?config.sources,
        "Effective settings"
    );

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let credentials = CredentialSnapshot::capture(&args.credentials(&config));
    if config.sources.contains(&Source::ValorEconomico) && !credentials.has(Source::ValorEconomico) {
        info!("No Valor Econômico credentials; that source will be crawled without login");
    }

    // First interrupt stops crawls at their next page; a second one exits.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.cancel() {
                    error!("Second interrupt; exiting without writing results");
                    std::process::exit(130);
                }
                warn!("Interrupt received; finishing in-flight requests (press Ctrl-C again to exit)");
            }
        });
    }

    let ctx = Arc::new(RunContext::new(HttpFetcher::new()?, &config, credentials).with_cancel(cancel));
    let result = run_extraction(
        &ctx,
        &config.sources,
        &config.query,
        config.days,
        config.max_pages,
        config.parallel,
    )
    .await;

    for report in result.per_source_status.values() {
        match &report.status {
            SourceStatus::Completed => info!(
                source = %report.source,
                records = report.records,
                pages = report.pages_fetched,
                skipped = report.articles_skipped,
                authenticated = ?report.authenticated,
                "Source completed"
            ),
            SourceStatus::Aborted { reason } | SourceStatus::Errored { reason } => warn!(
                source = %report.source,
                status = report.status.label(),
                %reason,
                records = report.records,
                "Source did not complete"
            ),
        }
    }

    info!(
        completed = result.count_with_status("completed"),
        aborted = result.count_with_status("aborted"),
        errored = result.count_with_status("errored"),
        "Sources finished"
    );

    let path = spreadsheet::write_spreadsheet(&result.records, &config.output_dir, result.started_at).await?;
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Err(e) = history::append_history(&config.output_dir, RunRecord::from_run(&result, &file)).await {
        error!(error = %e, "Failed to update run history");
    }

    info!(
        records = result.records.len(),
        path = %path.display(),
        "Extraction finished"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn show_history(args: HistoryArgs) -> Result<(), Box<dyn Error>> {
    let config = ExtractorConfig::load(args.config.as_deref())?;
    let output_dir = args.output_dir.unwrap_or(config.output_dir);

    let entries = history::load_history(&output_dir).await;
    if entries.is_empty() {
        println!("No runs recorded in {output_dir}");
        return Ok(());
    }

    let skip = args
        .limit
        .map(|n| entries.len().saturating_sub(n))
        .unwrap_or(0);
    for entry in entries.iter().skip(skip) {
        println!(
            "{}  {:>4} news  {:>7.1}s  {}d  \"{}\"  {}",
            entry.timestamp, entry.news_count, entry.duration, entry.days, entry.query, entry.file
        );
    }
    Ok(())
}
