//! Club filter and in-run deduplication.
//!
//! The federation page lists every match of a competition, and repeats some
//! of them across overlapping views. These two pure steps narrow the parsed
//! rows down to the club's own matches, each listed once.

use crate::models::FixtureRow;
use crate::utils::fold_name;
use itertools::Itertools;
use tracing::{debug, instrument};

/// Whether either team name contains the club's identifying substring,
/// ignoring case, accents and whitespace runs. An empty needle matches nothing.
pub fn involves_club(row: &FixtureRow, club: &str) -> bool {
    let needle = fold_name(club);
    if needle.is_empty() {
        return false;
    }
    fold_name(&row.home_team).contains(&needle) || fold_name(&row.away_team).contains(&needle)
}

/// Keep only rows where the club plays, preserving order.
#[instrument(level = "debug", skip(rows), fields(input = rows.len()))]
pub fn keep_club_rows(rows: Vec<FixtureRow>, club: &str) -> Vec<FixtureRow> {
    let kept: Vec<FixtureRow> = rows.into_iter().filter(|r| involves_club(r, club)).collect();
    debug!(kept = kept.len(), "Filtered club rows");
    kept
}

/// Drop rows whose composite key was already seen, keeping the first one.
///
/// Returns the surviving rows and how many were dropped.
pub fn dedup_rows(rows: Vec<FixtureRow>, by_category: bool) -> (Vec<FixtureRow>, usize) {
    let before = rows.len();
    let unique: Vec<FixtureRow> = rows
        .into_iter()
        .unique_by(|r| r.dedup_key(by_category))
        .collect();
    let dropped = before - unique.len();
    if dropped > 0 {
        debug!(dropped, "Dropped duplicate rows");
    }
    (unique, dropped)
}
