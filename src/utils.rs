//! Utility functions for text normalization, logging and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Identity keys for match records ([`normalize_key`])
//! - Accent- and case-insensitive name folding ([`fold_name`])
//! - String truncation for logging
//! - Competition titles recovered from source URLs
//! - File system validation for output directories

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Decompose to NFD and keep only ASCII, dropping combining marks
/// (`"Cádiz"` becomes `"Cadiz"`).
fn strip_accents(s: &str) -> String {
    s.nfd().filter(char::is_ascii).collect()
}

/// Build a stable identity key from free-text parts.
///
/// The parts are joined, accents are stripped, the result is lowercased and
/// every run of non-alphanumeric characters (whitespace, slashes, dashes,
/// punctuation) collapses to a single underscore. Leading and trailing
/// underscores are trimmed.
///
/// This is the only place record identities are derived; any change here
/// changes the `id` of every stored record.
///
/// # Examples
///
/// ```ignore
/// let id = normalize_key(&["14/02/2026", "Cadete Masculino", "ADESA 80", "ISAVAL CBA"]);
/// assert_eq!(id, "14_02_2026_cadete_masculino_adesa_80_isaval_cba");
/// ```
pub fn normalize_key(parts: &[&str]) -> String {
    let folded = strip_accents(&parts.join(" ")).to_lowercase();
    let mut key = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c);
        } else {
            pending_sep = true;
        }
    }
    key
}

/// Fold a display name for comparisons: accents stripped, lowercased,
/// whitespace collapsed to single spaces.
pub fn fold_name(name: &str) -> String {
    strip_accents(name)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
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

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Derive a readable competition title from the last path segment of a URL.
///
/// Used when the page itself carries no heading:
/// `.../copa-andaluc%C3%ADa-a` becomes `"Copa Andalucía A"`.
pub fn title_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let slug = parsed.path_segments()?.rfind(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(slug).ok()?;
    let title = decoded
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| upcase(&w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a scratch file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
