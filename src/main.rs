//! # Club Fixtures
//!
//! Keeps a basketball club's match list in sync with its federation's
//! published calendar. Each run scrapes the competition page, keeps the rows
//! where the club plays, and merges them into a JSON snapshot that a static
//! site reads.
//!
//! ## Usage
//!
//! ```sh
//! club_fixtures --config club.yaml
//! club_fixtures --config club.yaml --check
//! club_fixtures --config club.yaml --reset
//! ```
//!
//! ## Architecture
//!
//! One run is a strictly sequential pipeline:
//! 1. **Fetching**: plain HTTP, retried with backoff; a 403 escalates to a
//!    browser-rendered fetch when the `render` feature is built in
//! 2. **Parsing**: category headers and match rows, scanned in document order
//! 3. **Filtering**: only the club's matches, each listed once
//! 4. **Merging**: update-or-append against the stored snapshot
//! 5. **Output**: the snapshot JSON, the result attempts ledger and,
//!    optionally, league standings and today's open matches
//!
//! Exit status is nonzero on any fatal error, zero on success or when there
//! was nothing to change.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod cli;
mod config;
mod error;
mod fetch;
mod filter;
mod merge;
mod models;
mod outputs;
mod pipeline;
#[cfg(feature = "render")]
mod render;
mod scrapers;
mod utils;

use cli::Cli;
use config::{ClubConfig, load_config};
use error::ConfigError;
use fetch::{Fetcher, HttpFetch};
use pipeline::RunOptions;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("club_fixtures starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match load_config(&args.config).and_then(|c| apply_overrides(c, &args)) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    if args.reset {
        let removed = outputs::attempts::reset_attempts(&config.attempts_path).await?;
        info!(removed, elapsed = ?start_time.elapsed(), "Reset complete");
        return Ok(());
    }

    if args.check {
        let pending = pipeline::check_pending(&config, Local::now()).await?;
        info!(pending = pending.len(), elapsed = ?start_time.elapsed(), "Check complete");
        return Ok(());
    }

    // Early check: ensure the snapshot's directory is writable
    let output_dir = config
        .output
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let plain = HttpFetch::new(&config.fetch)?;
    let options = RunOptions {
        force_write: args.force_write,
    };

    #[cfg(feature = "render")]
    let result = {
        let rendered = config.fetch.webdriver_url.as_ref().map(|server| {
            render::WebDriverFetch::new(
                server.clone(),
                config.table.row_selector.clone(),
                config.fetch.timeout(),
            )
        });
        let fetcher = Fetcher::new(plain, rendered, &config.fetch);
        pipeline::run(&config, &fetcher, options, Local::now()).await
    };

    #[cfg(not(feature = "render"))]
    let result = {
        if config.fetch.webdriver_url.is_some() {
            tracing::warn!("webdriver_url is set but this build lacks the `render` feature; plain HTTP only");
        }
        let fetcher: Fetcher<HttpFetch> = Fetcher::new(plain, None, &config.fetch);
        pipeline::run(&config, &fetcher, options, Local::now()).await
    };

    let elapsed = start_time.elapsed();
    match result {
        Ok(summary) => {
            info!(
                ?elapsed,
                written = summary.written,
                total = summary.total,
                "Execution complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Run failed");
            Err(e.into())
        }
    }
}

/// Fold command-line overrides into the loaded config.
fn apply_overrides(mut config: ClubConfig, args: &Cli) -> Result<ClubConfig, ConfigError> {
    if let Some(url) = &args.url {
        Url::parse(url).map_err(|_| ConfigError::Url(url.clone()))?;
        config.source_url = url.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    Ok(config)
}
