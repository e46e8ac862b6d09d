//! Error taxonomy for the fixtures pipeline.
//!
//! Failures fall into four families, each with its own propagation policy:
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`FetchError`] | [`crate::fetch`] | Retried and escalated; fatal once [`FetchError::Exhausted`] |
//! | [`ParseRowError`] | [`crate::scrapers::federation`] | Always recovered by skipping the row |
//! | [`PersistError`] | [`crate::outputs::json`] | Always fatal |
//! | [`ConfigError`] | [`crate::config`] | Always fatal |
//!
//! [`PipelineError`] gathers the fatal ones for a single run.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// A failed attempt to retrieve a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered 403; plain HTTP is being blocked.
    #[error("request blocked with HTTP 403")]
    Blocked,

    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The browser-rendered fetch failed (session, navigation or timeout).
    #[error("rendered fetch failed: {0}")]
    Render(String),

    #[error("fetch gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether this failure should make the fetcher switch to the rendered path.
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            if status == StatusCode::FORBIDDEN {
                FetchError::Blocked
            } else {
                FetchError::Status(status)
            }
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Why a single table row was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRowError {
    #[error("row has {found} column(s), need at least {required}")]
    TooFewColumns { found: usize, required: usize },

    #[error("row is missing a team name")]
    MissingTeam,

    #[error("row is a bye week")]
    Bye,

    #[error("invalid date {0:?}, expected DD/MM/YYYY")]
    InvalidDate(String),
}

/// Reading or writing the on-disk snapshot failed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("invalid source url {0:?}")]
    Url(String),
}

/// A fatal failure of one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The page loaded but held no fixture table at all (not even rows that
    /// failed to parse), typically a challenge or maintenance page.
    #[error("page contained no fixture rows (preview: {preview})")]
    NoFixtures { preview: String },
}
