//! Utility functions for logging, text cleanup, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging
//! - Whitespace normalisation for scraped text
//! - Keyword relevance check for listings that ignore the search query
//! - File system validation for output directories

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// M&A vocabulary that marks an item as relevant regardless of the query.
const MA_KEYWORDS: [&str; 11] = [
    "fusão",
    "aquisição",
    "fusões",
    "aquisições",
    "compra",
    "adquiriu",
    "comprou",
    "transação",
    "m&a",
    "merger",
    "acquisition",
];

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse runs of whitespace (including non-breaking spaces) into single
/// spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `text` mentions a word of `query` or any M&A keyword.
/// Case-insensitive substring match.
pub fn is_relevant(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .any(|word| text.contains(&word))
        || MA_KEYWORDS.iter().any(|word| text.contains(word))
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        // "ç" and "ã" are two bytes each
        let result = truncate_for_log("aquisição", 6);
        assert_eq!(result, "aquisi…(+5 bytes)");
        let result = truncate_for_log("aquisição", 7);
        assert_eq!(result, "aquisi…(+5 bytes)");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  A\n\t Alpha\u{a0} comprou  "), "A Alpha comprou");
        assert_eq!(normalize_whitespace(" \n "), "");
    }

    #[test]
    fn test_is_relevant() {
        assert!(is_relevant("Zeta conclui AQUISIÇÃO da Eta", "xyz"));
        assert!(is_relevant("https://site.com/noticias/merger-alpha", "xyz"));
        assert!(is_relevant("Resultado trimestral da Petrobras", "petrobras"));
        assert!(!is_relevant("Resultado trimestral da Petrobras", "vale"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let dir = std::env::temp_dir().join(format!("ma-news-utils-{}", std::process::id()));
        let path = dir.to_string_lossy().to_string();
        ensure_writable_dir(&path).await.unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
