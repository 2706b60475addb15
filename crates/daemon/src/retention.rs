use chrono::Utc;
use nav_backup_core::naming::{is_expired, is_snapshot_filename, remote_path, retention_cutoff, SCAN_LOCATIONS};
use nav_backup_core::BackupFileRef;
use tracing::{debug, info, warn};

use crate::session::Session;

/// Snapshot files in every scanned location, directory first. A location
/// that cannot be listed contributes nothing.
pub async fn enumerate_snapshots(session: &Session) -> Vec<BackupFileRef> {
    let mut found = Vec::new();
    for dir in SCAN_LOCATIONS {
        let entries = match session.list(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir, error = %err, "could not list remote directory");
                continue;
            }
        };
        found.extend(
            entries
                .into_iter()
                .filter(|e| !e.is_dir && is_snapshot_filename(&e.basename))
                .map(|e| BackupFileRef {
                    path: remote_path(dir, &e.basename),
                    filename: e.basename,
                    size: e.size,
                    last_modified: e.last_modified,
                }),
        );
    }
    found
}

/// Deletes snapshots dated more than `keep_days` days before today (UTC).
/// Returns how many files were removed; individual failures are logged.
pub async fn cleanup(session: &Session, keep_days: u32) -> usize {
    let Some(cutoff) = retention_cutoff(Utc::now().date_naive(), keep_days) else {
        warn!(keep_days, "retention window exceeds the calendar, skipping cleanup");
        return 0;
    };
    delete_older_than(session, &cutoff).await
}

async fn delete_older_than(session: &Session, cutoff: &str) -> usize {
    let mut removed = 0;
    for file in enumerate_snapshots(session).await {
        if !is_expired(&file.filename, cutoff) {
            continue;
        }
        match session.delete(&file.path).await {
            Ok(()) => {
                debug!(path = %file.path, "deleted old backup");
                removed += 1;
            }
            Err(err) => warn!(path = %file.path, error = %err, "could not delete old backup"),
        }
    }
    if removed > 0 {
        info!(removed, cutoff, "retention removed old backups");
    }
    removed
}
