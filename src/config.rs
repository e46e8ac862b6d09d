//! Club configuration loaded from a YAML file.
//!
//! A minimal configuration only names the club and the page to scrape:
//!
//! ```yaml
//! team_name: "ISAVAL CBA"
//! club_match: "CBA"
//! source_url: "https://www.example-federation.es/competicion/liga-provincial"
//! ```
//!
//! Everything else has a default. The table layout may be a preset name
//! (`calendar` or `results`) or an explicit column map:
//!
//! ```yaml
//! table:
//!   layout:
//!     teams: { stacked: { cell: 0 } }
//!     scores: { combined: { cell: 1 } }
//!     schedule: 2
//!     venue: 3
//! ```

use crate::error::ConfigError;
use crate::scrapers::federation::{ScoreColumns, TableLayout, TeamColumns};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

fn default_output() -> PathBuf {
    PathBuf::from("data/matches.json")
}

fn default_attempts_path() -> PathBuf {
    PathBuf::from("data/result_attempts.json")
}

fn default_max_result_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_match_duration() -> u32 {
    1
}

/// Top-level configuration for one club.
#[derive(Debug, Clone, Deserialize)]
pub struct ClubConfig {
    /// Display name of the club's team.
    pub team_name: String,
    /// Substring identifying the club inside scraped team names.
    /// Falls back to `team_name`.
    #[serde(default)]
    pub club_match: Option<String>,
    pub source_url: String,
    /// Competition label stamped on every record.
    #[serde(default)]
    pub competition: Option<String>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub standings_output: Option<PathBuf>,
    /// Today's matches still without a result, for the site's live box.
    #[serde(default)]
    pub today_output: Option<PathBuf>,
    /// Per-match count of runs that found no result after the match ended.
    #[serde(default = "default_attempts_path")]
    pub attempts_path: PathBuf,
    /// Runs after which a missing result is taken as postponed.
    #[serde(default = "default_max_result_attempts")]
    pub max_result_attempts: u32,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default = "default_true")]
    pub dedup_by_category: bool,
    #[serde(default = "default_match_duration")]
    pub match_duration_hours: u32,
}

impl ClubConfig {
    pub fn club_match(&self) -> &str {
        self.club_match.as_deref().unwrap_or(&self.team_name)
    }

    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ClubConfig =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        Url::parse(&config.source_url).map_err(|_| ConfigError::Url(config.source_url.clone()))?;
        Ok(config)
    }
}

/// Load the club configuration from `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Result<ClubConfig, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ClubConfig::from_yaml_str(&yaml, path)?;
    info!(team = %config.team_name, source_url = %config.source_url, "Loaded club configuration");
    Ok(config)
}

/// Network settings for the fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Total attempts across plain and rendered fetches.
    pub max_attempts: usize,
    /// Delay unit; attempt `n` waits `n × base_delay_ms`.
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay.
    pub jitter_ms: u64,
    /// WebDriver endpoint for the rendered fallback (`render` feature).
    pub webdriver_url: Option<String>,
    pub user_agents: Vec<String>,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 2000,
            jitter_ms: 250,
            webdriver_url: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Where the tables live in the page and how their columns are laid out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub header_selector: String,
    pub row_selector: String,
    pub layout: LayoutChoice,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            header_selector: "header.nombre_tabla h5".to_string(),
            row_selector: "table tbody tr".to_string(),
            layout: LayoutChoice::Preset(LayoutPreset::Calendar),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    /// Home, home score, away score, away, date/time, venue.
    Calendar,
    /// Stacked teams, combined score, date/time, venue.
    Results,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LayoutChoice {
    Preset(LayoutPreset),
    Columns(TableLayout),
}

impl LayoutChoice {
    pub fn resolve(&self) -> TableLayout {
        match self {
            LayoutChoice::Preset(LayoutPreset::Calendar) => TableLayout {
                teams: TeamColumns::Split { home: 0, away: 3 },
                scores: ScoreColumns::Split { home: 1, away: 2 },
                schedule: 4,
                venue: Some(5),
            },
            LayoutChoice::Preset(LayoutPreset::Results) => TableLayout {
                teams: TeamColumns::Stacked { cell: 0 },
                scores: ScoreColumns::Combined { cell: 1 },
                schedule: 2,
                venue: Some(3),
            },
            LayoutChoice::Columns(layout) => layout.clone(),
        }
    }
}
