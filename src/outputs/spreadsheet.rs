//! Spreadsheet output.
//!
//! One CSV file per run, one row per [`TransactionRecord`], newest articles
//! first. Missing fields are written as `Não informado` so the sheet reads
//! cleanly when opened directly.
//!
//! ```text
//! output_dir/
//! ├── ma_noticias_20250506_040012.csv
//! └── extraction_history.json
//! ```

use crate::models::TransactionRecord;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Reverse;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const MISSING: &str = "Não informado";

#[derive(Debug, Serialize)]
struct Row<'a> {
    data: String,
    fonte: &'static str,
    titulo: &'a str,
    compradora: &'a str,
    adquirida: &'a str,
    valor: String,
    moeda: &'static str,
    multiplo: String,
    base_multiplo: &'static str,
    url: &'a str,
}

impl<'a> From<&'a TransactionRecord> for Row<'a> {
    fn from(r: &'a TransactionRecord) -> Self {
        Row {
            data: r
                .published_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            fonte: r.source.label(),
            titulo: &r.title,
            compradora: r.acquirer.as_deref().unwrap_or(MISSING),
            adquirida: r.acquired.as_deref().unwrap_or(MISSING),
            valor: r
                .value_amount
                .map(|v| v.to_string())
                .unwrap_or_else(|| MISSING.to_string()),
            moeda: if r.value_amount.is_some() {
                r.value_currency.code()
            } else {
                MISSING
            },
            multiplo: r
                .multiple_value
                .map(|m| format!("{m}x"))
                .unwrap_or_else(|| MISSING.to_string()),
            base_multiplo: match (r.multiple_value, r.multiple_base) {
                (Some(_), Some(base)) => base.label(),
                _ => MISSING,
            },
            url: &r.url,
        }
    }
}

/// `ma_noticias_<YYYYmmdd_HHMMSS>.csv`
pub fn spreadsheet_filename(now: DateTime<Local>) -> String {
    format!("ma_noticias_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Render records as CSV, newest first and undated last. Ties keep their
/// merge order.
pub fn to_csv(records: &[TransactionRecord]) -> Result<String, Box<dyn Error>> {
    let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
    sorted.sort_by_key(|r| (r.published_date.is_none(), Reverse(r.published_date)));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in sorted {
        writer.serialize(Row::from(record))?;
    }
    if records.is_empty() {
        writer.write_record([
            "data",
            "fonte",
            "titulo",
            "compradora",
            "adquirida",
            "valor",
            "moeda",
            "multiplo",
            "base_multiplo",
            "url",
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Write the run's spreadsheet into `output_dir` and return its path.
#[instrument(level = "info", skip_all, fields(%output_dir, count = records.len()))]
pub async fn write_spreadsheet(
    records: &[TransactionRecord],
    output_dir: &str,
    now: DateTime<Local>,
) -> Result<PathBuf, Box<dyn Error>> {
    let csv = to_csv(records)?;
    let path = Path::new(output_dir).join(spreadsheet_filename(now));
    fs::write(&path, csv).await?;
    info!(path = %path.display(), "Wrote spreadsheet");
    Ok(path)
}
