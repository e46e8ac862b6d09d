//! Data models for scraped fixtures and their persisted representation.
//!
//! - [`FixtureRow`]: one table row as parsed from the federation page
//! - [`MatchRecord`]: the persisted unit, with a stable derived `id`
//! - [`MatchStatus`]: `upcoming` → `in_progress` → `finished`
//! - [`Snapshot`]: the JSON document consumed by the site
//!
//! Persisted models use camelCase field names to match the JSON shape the
//! site templates read.

use crate::utils::{fold_name, normalize_key};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Date format used on the source page and in persisted records.
pub const DATE_FORMAT: &str = "%d/%m/%Y";
/// Time format used on the source page and in persisted records.
pub const TIME_FORMAT: &str = "%H:%M";

/// Kick-off assumed for matches published without a time.
fn default_kickoff() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Lifecycle of a match. Ordered so that `max` never moves a status backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    InProgress,
    Finished,
}

impl MatchStatus {
    /// Derive a status from the schedule and scores as seen at `now`.
    ///
    /// Both scores present means `Finished`. Otherwise the match is
    /// `InProgress` once its scheduled start (noon when no time is published)
    /// is not after `now`, and `Upcoming` before that.
    pub fn derive(
        date: NaiveDate,
        time: Option<NaiveTime>,
        home_score: Option<u32>,
        away_score: Option<u32>,
        now: NaiveDateTime,
    ) -> Self {
        if home_score.is_some() && away_score.is_some() {
            return MatchStatus::Finished;
        }
        let kickoff = date.and_time(time.unwrap_or_else(default_kickoff));
        if kickoff <= now {
            MatchStatus::InProgress
        } else {
            MatchStatus::Upcoming
        }
    }
}

/// A single row extracted from a results/schedule table.
///
/// Scores are positional: `home_score` is the number shown for `home_team`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRow {
    /// Section header the row appeared under (age/division).
    pub category: String,
    pub competition: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub venue: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

impl FixtureRow {
    pub fn date_text(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn has_result(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    /// The stable identity this row maps to.
    pub fn id(&self) -> String {
        match_id(&self.date_text(), &self.category, &self.home_team, &self.away_team)
    }

    /// Composite key used to drop repeats within one scrape.
    pub fn dedup_key(&self, by_category: bool) -> String {
        let date = self.date_text();
        let home = fold_name(&self.home_team);
        let away = fold_name(&self.away_team);
        if by_category {
            format!("{date}|{home}|{away}|{}", fold_name(&self.category))
        } else {
            format!("{date}|{home}|{away}")
        }
    }

    pub fn status_at(&self, now: NaiveDateTime) -> MatchStatus {
        MatchStatus::derive(self.date, self.time, self.home_score, self.away_score, now)
    }
}

/// Derive a record identity from its date, category and teams.
pub fn match_id(date: &str, category: &str, home_team: &str, away_team: &str) -> String {
    normalize_key(&[date, category, home_team, away_team])
}

/// A persisted match, as read by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    pub home_team: String,
    pub away_team: String,
    /// Calendar date as `DD/MM/YYYY`.
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    pub status: MatchStatus,
    pub last_updated: DateTime<Utc>,
}

impl MatchRecord {
    /// Build a fresh record from a parsed row, stamped with the run time.
    pub fn from_row(row: &FixtureRow, now: DateTime<Local>) -> Self {
        MatchRecord {
            id: row.id(),
            category: row.category.clone(),
            competition: row.competition.clone(),
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            date: row.date_text(),
            time: row.time.map(|t| t.format(TIME_FORMAT).to_string()),
            venue: row.venue.clone(),
            home_score: row.home_score,
            away_score: row.away_score,
            status: row.status_at(now.naive_local()),
            last_updated: now.with_timezone(&Utc),
        }
    }

    /// Recompute the identity from this record's own fields.
    pub fn derived_id(&self) -> String {
        match_id(&self.date, &self.category, &self.home_team, &self.away_team)
    }

    pub fn has_result(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    /// Scheduled start, falling back to noon when no time is stored.
    /// `None` when the stored date is not `DD/MM/YYYY`.
    pub fn kickoff(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()?;
        let time = self
            .time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, TIME_FORMAT).ok())
            .unwrap_or_else(default_kickoff);
        Some(date.and_time(time))
    }

    /// Whether the fields a reader cares about differ from `other`.
    pub fn materially_differs(&self, other: &MatchRecord) -> bool {
        self.status != other.status
            || self.time != other.time
            || self.home_score != other.home_score
            || self.away_score != other.away_score
    }
}

/// The JSON document written for the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub total_records: usize,
    pub records: Vec<MatchRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<MatchRecord>, last_updated: DateTime<Utc>) -> Self {
        Snapshot {
            last_updated,
            total_records: records.len(),
            records,
        }
    }
}
