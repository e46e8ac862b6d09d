//! Per-match budget for result lookups.
//!
//! Every run that still finds a match without a result after its expected
//! end counts one attempt against that match. Once a match reaches
//! `max_result_attempts` it is treated as postponed or unplayed: `--check`
//! stops listing it and later runs stop counting it. A match that gets its
//! result leaves the ledger.
//!
//! ```text
//! {
//!   "14_02_2026_cadete_masculino_adesa_80_isaval_cba": { "attempts": 2, "last": "2026-02-14T19:45:00Z" }
//! }
//! ```
//!
//! Entries not touched for [`STALE_AFTER_HOURS`] are dropped.

use crate::error::PersistError;
use crate::merge::pending_results;
use crate::models::MatchRecord;
use crate::outputs::json::write_json;
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const STALE_AFTER_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub attempts: u32,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptsLedger {
    entries: BTreeMap<String, AttemptEntry>,
}

impl AttemptsLedger {
    pub fn attempts(&self, id: &str) -> u32 {
        self.entries.get(id).map_or(0, |e| e.attempts)
    }

    pub fn is_exhausted(&self, id: &str, max: u32) -> bool {
        self.attempts(id) >= max
    }

    /// Count one more failed lookup for `id`; returns the new total.
    pub fn record_attempt(&mut self, id: &str, now: DateTime<Utc>) -> u32 {
        let entry = self.entries.entry(id.to_string()).or_insert(AttemptEntry {
            attempts: 0,
            last: now,
        });
        entry.attempts += 1;
        entry.last = now;
        entry.attempts
    }

    /// Forget `id`; returns whether it was tracked.
    pub fn resolve(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop entries last touched more than [`STALE_AFTER_HOURS`] ago.
    pub fn prune_stale(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let cutoff = now - Duration::hours(STALE_AFTER_HOURS);
        self.entries.retain(|_, e| e.last > cutoff);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What [`track_attempts`] did to the ledger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// Overdue matches charged one attempt in this run.
    pub attempted: usize,
    /// Tracked matches that now have a result.
    pub resolved: usize,
    /// Matches that reached the budget in this run.
    pub gave_up: usize,
    /// Stale entries dropped.
    pub pruned: usize,
}

impl LedgerUpdate {
    pub fn is_changed(&self) -> bool {
        self.attempted > 0 || self.resolved > 0 || self.pruned > 0
    }
}

/// Charge an attempt to every overdue match still within budget, and release
/// matches that got their result.
pub fn track_attempts(
    ledger: &mut AttemptsLedger,
    records: &[MatchRecord],
    now: DateTime<Local>,
    match_duration: Duration,
    max: u32,
) -> LedgerUpdate {
    let stamp = now.with_timezone(&Utc);
    let mut update = LedgerUpdate {
        pruned: ledger.prune_stale(stamp),
        ..LedgerUpdate::default()
    };

    for record in records.iter().filter(|r| r.has_result()) {
        if ledger.resolve(&record.id) {
            debug!(id = %record.id, "Result arrived; released from ledger");
            update.resolved += 1;
        }
    }

    for record in pending_results(records, now.naive_local(), match_duration) {
        if ledger.is_exhausted(&record.id, max) {
            continue;
        }
        let n = ledger.record_attempt(&record.id, stamp);
        update.attempted += 1;
        if n >= max {
            info!(
                id = %record.id,
                home = %record.home_team,
                away = %record.away_team,
                attempts = n,
                "Giving up on result (postponed or unplayed)"
            );
            update.gave_up += 1;
        } else {
            debug!(id = %record.id, attempts = n, max, "Result still missing");
        }
    }
    update
}

/// Read the ledger; a missing or unreadable-as-JSON file starts empty.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_attempts(path: &Path) -> Result<AttemptsLedger, PersistError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AttemptsLedger::default()),
        Err(source) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match serde_json::from_str(&text) {
        Ok(ledger) => Ok(ledger),
        Err(e) => {
            warn!(error = %e, "Attempts ledger is not valid JSON; starting empty");
            Ok(AttemptsLedger::default())
        }
    }
}

pub async fn write_attempts(ledger: &AttemptsLedger, path: &Path) -> Result<(), PersistError> {
    write_json(ledger, path).await
}

/// Delete the ledger file; returns whether there was one.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn reset_attempts(path: &Path) -> Result<bool, PersistError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!("Attempts ledger reset");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No attempts ledger to reset");
            Ok(false)
        }
        Err(source) => Err(PersistError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}
