//! Publication date parsing and the recency window.
//!
//! The three sources print dates differently: `06/05/2025 às 14h30`,
//! `6 de maio de 2025`, or an ISO timestamp in a `datetime` attribute. All of
//! them are reduced to a [`NaiveDate`].

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b").unwrap());
static WRITTEN_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s+de\s+(\p{L}+)\s+de\s+(\d{4})\b").unwrap());
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").unwrap());

/// Parse a date out of free text. Returns `None` when no known layout matches
/// or the numbers do not form a calendar date.
pub fn parse_published_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(c) = ISO_DATE.captures(text) {
        let date = NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        if date.is_some() {
            return date;
        }
    }

    if let Some(c) = NUMERIC_DATE.captures(text) {
        let day: u32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let mut year: i32 = c[3].parse().ok()?;
        if c[3].len() == 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(c) = WRITTEN_DATE.captures(text) {
        let day: u32 = c[1].parse().ok()?;
        let month = month_number(&c[2])?;
        let year: i32 = c[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Portuguese month name (full or three-letter) to its number.
fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    let month = match name.as_str() {
        "janeiro" | "jan" => 1,
        "fevereiro" | "fev" => 2,
        "março" | "marco" | "mar" => 3,
        "abril" | "abr" => 4,
        "maio" | "mai" => 5,
        "junho" | "jun" => 6,
        "julho" | "jul" => 7,
        "agosto" | "ago" => 8,
        "setembro" | "set" => 9,
        "outubro" | "out" => 10,
        "novembro" | "nov" => 11,
        "dezembro" | "dez" => 12,
        _ => return None,
    };
    Some(month)
}

/// Earliest eligible publish date for a run looking back `days` days.
/// A window reaching past the calendar's start is clamped to it.
pub fn cutoff_for(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Whether an article belongs in the run.
///
/// Articles without a usable date are kept; excluding them would silently
/// drop content the source did not label.
pub fn is_within_window(published: Option<NaiveDate>, cutoff: NaiveDate) -> bool {
    match published {
        Some(date) => date >= cutoff,
        None => {
            debug!(%cutoff, "Missing or unparseable publish date; keeping article");
            true
        }
    }
}

/// Whether a dated item is old enough to stop paging. Undated items never
/// stop pagination.
pub fn is_past_cutoff(published: Option<NaiveDate>, cutoff: NaiveDate) -> bool {
    matches!(published, Some(date) if date < cutoff)
}
