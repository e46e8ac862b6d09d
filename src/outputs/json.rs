//! JSON snapshot persistence.
//!
//! The snapshot is the only state shared between runs: read once at the
//! start, rewritten in full at the end. Writes are plain overwrites, not
//! atomic renames.
//!
//! # Output Structure
//!
//! ```text
//! {
//!   "lastUpdated": "2026-02-15T09:00:00Z",
//!   "totalRecords": 2,
//!   "records": [ { "id": "14_02_2026_cadete_masculino_adesa_80_isaval_cba", ... } ]
//! }
//! ```

use crate::error::PersistError;
use crate::models::Snapshot;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Read the stored snapshot.
///
/// A missing file is not an error (first run). A file that exists but does
/// not decode is, since overwriting it would drop its history.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, PersistError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No snapshot yet; starting empty");
            return Ok(None);
        }
        Err(source) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let snapshot: Snapshot =
        serde_json::from_str(&text).map_err(|source| PersistError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    let legacy = snapshot.records.iter().filter(|r| r.derived_id() != r.id).count();
    if legacy > 0 {
        warn!(legacy, "Stored ids no longer match their fields; those records will not be updated");
    }
    info!(
        records = snapshot.records.len(),
        last_updated = %snapshot.last_updated,
        "Loaded snapshot"
    );
    Ok(Some(snapshot))
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(source) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %source, "Failed to create output dir");
            return Err(PersistError::Write {
                path: dir.to_path_buf(),
                source,
            });
        }
    }

    fs::write(path, json)
        .await
        .map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Wrote JSON file");
    Ok(())
}

/// Overwrite the snapshot file with `snapshot`.
pub async fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<(), PersistError> {
    write_json(snapshot, path).await?;
    info!(records = snapshot.total_records, path = %path.display(), "Snapshot saved");
    Ok(())
}
