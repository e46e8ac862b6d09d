//! Command-line interface definitions.
//!
//! Everything about the club lives in the YAML config; the flags only pick
//! the config file, override where the data comes from and goes to, and
//! select the mode.

use clap::Parser;
use std::path::PathBuf;

/// Scrape a basketball federation's fixture tables and keep a club's match
/// list up to date in a JSON file.
///
/// # Examples
///
/// ```sh
/// # Regular scheduled run
/// club_fixtures --config club.yaml
///
/// # List matches that should have a result by now, without fetching
/// club_fixtures --config club.yaml --check
///
/// # Start counting result attempts from zero again
/// club_fixtures --config club.yaml --reset
///
/// # Different page, different output
/// FEDERATION_URL=https://... club_fixtures -o /srv/site/data/matches.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the club config YAML file
    #[arg(short, long, default_value = "club.yaml")]
    pub config: PathBuf,

    /// Snapshot JSON path, overriding `output` in the config
    #[arg(short, long, env = "FIXTURES_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Federation page URL, overriding `source_url` in the config
    #[arg(short, long, env = "FEDERATION_URL")]
    pub url: Option<String>,

    /// Only list stored matches still waiting for a result
    #[arg(long)]
    pub check: bool,

    /// Rewrite the snapshot even when nothing changed
    #[arg(long, conflicts_with = "check")]
    pub force_write: bool,

    /// Delete the result attempts ledger and exit
    #[arg(long, conflicts_with_all = ["check", "force_write"])]
    pub reset: bool,
}
