//! Smart merge of freshly scraped rows into the persisted collection.
//!
//! The scrape is a window onto the season, not a full snapshot of it, so the
//! merge only ever updates or appends:
//!
//! - a row whose derived `id` matches a stored record overwrites that record's
//!   fields, keeping the stored `id`
//! - a row with an unknown `id` is appended
//! - stored records missing from the batch are left untouched
//!
//! Updates never move a record's status backwards. A row that arrives
//! without scores for a record that already has them keeps the stored scores.

use crate::models::{DATE_FORMAT, FixtureRow, MatchRecord};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// What a merge did to the collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Records appended.
    pub new: usize,
    /// Existing records whose status, time or scores changed.
    pub updated: usize,
    /// Existing records seen again with nothing material changed.
    pub unchanged: usize,
}

impl MergeReport {
    /// Whether the merged collection differs materially from the stored one.
    pub fn is_changed(&self) -> bool {
        self.new > 0 || self.updated > 0
    }
}

/// Merge `batch` into `existing`, stamping touched records with `now`.
#[instrument(level = "info", skip_all, fields(existing = existing.len(), batch = batch.len()))]
pub fn merge_records(
    existing: Vec<MatchRecord>,
    batch: &[FixtureRow],
    now: DateTime<Local>,
) -> (Vec<MatchRecord>, MergeReport) {
    let mut records = existing;
    let mut index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();
    let mut report = MergeReport::default();

    for row in batch {
        let fresh = MatchRecord::from_row(row, now);
        match index.get(&fresh.id) {
            Some(&i) => {
                let before = records[i].clone();
                apply_update(&mut records[i], fresh);
                if before.materially_differs(&records[i]) {
                    debug!(
                        id = %records[i].id,
                        from = ?before.status,
                        to = ?records[i].status,
                        "Updated record"
                    );
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                debug!(id = %fresh.id, "New record");
                index.insert(fresh.id.clone(), records.len());
                records.push(fresh);
                report.new += 1;
            }
        }
    }

    info!(
        new = report.new,
        updated = report.updated,
        unchanged = report.unchanged,
        total = records.len(),
        "Merged batch"
    );
    (records, report)
}

fn apply_update(existing: &mut MatchRecord, fresh: MatchRecord) {
    let (home_score, away_score) = if existing.has_result() && !fresh.has_result() {
        (existing.home_score, existing.away_score)
    } else {
        (fresh.home_score, fresh.away_score)
    };
    let id = std::mem::take(&mut existing.id);
    let status = existing.status.max(fresh.status);
    *existing = MatchRecord {
        id,
        home_score,
        away_score,
        status,
        ..fresh
    };
}

/// Records still waiting for a result although they should have ended:
/// no scores, and `kickoff + match_duration` is before `now`.
pub fn pending_results(
    records: &[MatchRecord],
    now: NaiveDateTime,
    match_duration: Duration,
) -> Vec<&MatchRecord> {
    records
        .iter()
        .filter(|r| !r.has_result())
        .filter(|r| r.kickoff().is_some_and(|k| k + match_duration < now))
        .collect()
}

/// Matches scheduled for `today` that have no result yet.
pub fn todays_open_matches(records: &[MatchRecord], today: NaiveDate) -> Vec<&MatchRecord> {
    let today = today.format(DATE_FORMAT).to_string();
    records
        .iter()
        .filter(|r| r.date == today && !r.has_result())
        .collect()
}
