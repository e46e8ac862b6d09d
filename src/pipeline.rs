//! One scheduled run: fetch → parse → filter → dedup → merge → persist.
//!
//! The snapshot and the result attempts ledger are read before any network
//! work so a corrupt snapshot aborts the run early instead of after a slow
//! fetch. Each stage is a plain function;
//! this module only sequences them and decides whether to write.

use crate::config::ClubConfig;
use crate::error::PipelineError;
use crate::fetch::{Fetcher, PageFetch};
use crate::filter::{dedup_rows, keep_club_rows};
use crate::merge::{MergeReport, merge_records, pending_results};
use crate::models::{MatchRecord, Snapshot};
use crate::outputs::attempts::{LedgerUpdate, load_attempts, track_attempts, write_attempts};
use crate::outputs::json::{load_snapshot, write_snapshot};
use crate::outputs::standings::{StandingsDocument, compute_standings, write_standings};
use crate::outputs::today::{TodayDocument, write_today};
use crate::scrapers::federation::FixtureParser;
use crate::utils::{title_from_url, truncate_for_log};
use chrono::{DateTime, Duration, Local, Utc};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Rewrite the snapshot even when nothing changed.
    pub force_write: bool,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub parsed: usize,
    pub skipped: usize,
    pub club_rows: usize,
    pub duplicates: usize,
    pub merge: MergeReport,
    pub attempts: LedgerUpdate,
    pub total: usize,
    pub written: bool,
}

/// Execute one full run against the configured source.
#[instrument(level = "info", skip_all, fields(url = %config.source_url))]
pub async fn run<P, R>(
    config: &ClubConfig,
    fetcher: &Fetcher<P, R>,
    options: RunOptions,
    now: DateTime<Local>,
) -> Result<RunSummary, PipelineError>
where
    P: PageFetch,
    R: PageFetch,
{
    let t0 = Instant::now();
    let stored = load_snapshot(&config.output).await?;
    let had_snapshot = stored.is_some();
    let existing = stored.map(|s| s.records).unwrap_or_default();
    let mut ledger = load_attempts(&config.attempts_path).await?;

    let html = fetcher.fetch(&config.source_url).await?;

    let parser = FixtureParser::new(&config.table)?
        .with_competition(config.competition.clone())
        .with_fallback_competition(title_from_url(&config.source_url));
    let outcome = parser.parse(&html);
    if outcome.rows.is_empty() && outcome.skipped.is_empty() {
        return Err(PipelineError::NoFixtures {
            preview: truncate_for_log(&html, 200),
        });
    }
    debug!(heading = outcome.heading.as_deref().unwrap_or(""), "Page heading");
    let parsed = outcome.rows.len();
    let skipped = outcome.skipped.len();

    if let Some(path) = &config.standings_output {
        let (all_rows, _) = dedup_rows(outcome.rows.clone(), config.dedup_by_category);
        let doc = StandingsDocument {
            last_updated: now.with_timezone(&Utc),
            categories: compute_standings(&all_rows),
        };
        write_standings(&doc, path).await?;
        info!(path = %path.display(), categories = doc.categories.len(), "Wrote standings");
    }

    let club_rows = keep_club_rows(outcome.rows, config.club_match());
    let club_count = club_rows.len();
    if club_count == 0 {
        warn!(club = %config.club_match(), "No rows mention the club");
    }
    let (batch, duplicates) = dedup_rows(club_rows, config.dedup_by_category);

    let (records, merge) = merge_records(existing, &batch, now);
    let total = records.len();

    let attempts = track_attempts(
        &mut ledger,
        &records,
        now,
        match_duration(config),
        config.max_result_attempts,
    );
    if attempts.is_changed() {
        write_attempts(&ledger, &config.attempts_path).await?;
    }

    if let Some(path) = &config.today_output {
        write_today(&TodayDocument::build(&records, now), path).await?;
    }

    let written = if !had_snapshot || merge.is_changed() || options.force_write {
        write_snapshot(&Snapshot::new(records, now.with_timezone(&Utc)), &config.output).await?;
        true
    } else {
        info!("No changes detected; snapshot left as is");
        false
    };

    let summary = RunSummary {
        parsed,
        skipped,
        club_rows: club_count,
        duplicates,
        merge,
        attempts,
        total,
        written,
    };
    info!(
        parsed,
        skipped,
        kept = club_count,
        duplicates,
        new = merge.new,
        updated = merge.updated,
        unchanged = merge.unchanged,
        awaiting_result = attempts.attempted,
        gave_up = attempts.gave_up,
        total,
        written,
        elapsed_ms = t0.elapsed().as_millis(),
        "Run complete"
    );
    Ok(summary)
}

fn match_duration(config: &ClubConfig) -> Duration {
    Duration::hours(i64::from(config.match_duration_hours))
}

/// List stored matches that should have finished but still lack a result.
///
/// Matches that used up `max_result_attempts` are left out. Reads local
/// files only; no network access.
#[instrument(level = "info", skip_all, fields(path = %config.output.display()))]
pub async fn check_pending(
    config: &ClubConfig,
    now: DateTime<Local>,
) -> Result<Vec<MatchRecord>, PipelineError> {
    let Some(snapshot) = load_snapshot(&config.output).await? else {
        warn!("No snapshot to check");
        return Ok(Vec::new());
    };
    let ledger = load_attempts(&config.attempts_path).await?;
    let overdue = pending_results(&snapshot.records, now.naive_local(), match_duration(config));
    let (abandoned, pending): (Vec<&MatchRecord>, Vec<&MatchRecord>) = overdue
        .into_iter()
        .partition(|r| ledger.is_exhausted(&r.id, config.max_result_attempts));
    if !abandoned.is_empty() {
        info!(
            count = abandoned.len(),
            max = config.max_result_attempts,
            "Skipping matches with no result after every attempt"
        );
    }
    let pending: Vec<MatchRecord> = pending.into_iter().cloned().collect();
    for record in &pending {
        info!(
            id = %record.id,
            date = %record.date,
            time = record.time.as_deref().unwrap_or("-"),
            home = %record.home_team,
            away = %record.away_team,
            "Result pending"
        );
    }
    info!(pending = pending.len(), total = snapshot.records.len(), "Pending check complete");
    Ok(pending)
}
