//! Run history kept next to the spreadsheets.
//!
//! `extraction_history.json` is a JSON array with one entry per completed
//! run, appended in run order:
//!
//! ```json
//! [
//!   {
//!     "timestamp": "2025-05-06 04:00:12",
//!     "duration": 81.4,
//!     "file": "ma_noticias_20250506_040012.csv",
//!     "query": "fusão aquisição M&A",
//!     "days": 30,
//!     "news_count": 17
//!   }
//! ]
//! ```
//!
//! An unreadable history is logged and treated as empty so a corrupt file
//! never blocks a run.

use crate::models::RunResult;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const HISTORY_FILE: &str = "extraction_history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Local start time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    /// Seconds.
    pub duration: f64,
    pub file: String,
    pub query: String,
    pub days: u32,
    #[serde(default)]
    pub news_count: usize,
}

impl RunRecord {
    pub fn from_run(run: &RunResult, file: &str) -> Self {
        Self {
            timestamp: run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration: run.duration.as_secs_f64(),
            file: file.to_string(),
            query: run.query.clone(),
            days: run.days,
            news_count: run.records.len(),
        }
    }
}

pub fn history_path(output_dir: &str) -> PathBuf {
    Path::new(output_dir).join(HISTORY_FILE)
}

#[instrument(level = "info", skip_all, fields(%output_dir))]
pub async fn load_history(output_dir: &str) -> Vec<RunRecord> {
    let path = history_path(output_dir);
    let raw = match fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read history; starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<RunRecord>>(&raw) {
        Ok(history) => {
            info!(count = history.len(), "Loaded run history");
            history
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "History is not valid JSON; starting empty");
            Vec::new()
        }
    }
}

/// Append `record` and rewrite the file.
#[instrument(level = "info", skip_all, fields(%output_dir, file = %record.file))]
pub async fn append_history(output_dir: &str, record: RunRecord) -> Result<(), Box<dyn Error>> {
    let mut history = load_history(output_dir).await;
    history.push(record);
    let json = serde_json::to_string_pretty(&history)?;
    let path = history_path(output_dir);
    fs::write(&path, json).await?;
    info!(path = %path.display(), entries = history.len(), "Wrote run history");
    Ok(())
}
