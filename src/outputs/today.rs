//! Today's club matches that still have no result.
//!
//! Rewritten on every run, even when empty, so the site never shows a
//! previous day's list.

use crate::error::PersistError;
use crate::merge::todays_open_matches;
use crate::models::{DATE_FORMAT, MatchRecord};
use crate::outputs::json::write_json;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayDocument<'a> {
    /// `DD/MM/YYYY`, same as the records.
    pub date: String,
    pub last_updated: DateTime<Utc>,
    pub matches: Vec<&'a MatchRecord>,
}

impl<'a> TodayDocument<'a> {
    pub fn build(records: &'a [MatchRecord], now: DateTime<Local>) -> Self {
        TodayDocument {
            date: now.date_naive().format(DATE_FORMAT).to_string(),
            last_updated: now.with_timezone(&Utc),
            matches: todays_open_matches(records, now.date_naive()),
        }
    }
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_today(doc: &TodayDocument<'_>, path: &Path) -> Result<(), PersistError> {
    write_json(doc, path).await?;
    info!(matches = doc.matches.len(), "Wrote today's matches");
    Ok(())
}
