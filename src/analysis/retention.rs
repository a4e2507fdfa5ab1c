use std::io::ErrorKind;

use anyhow::Result;

use crate::db::Database;
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Outcome of deleting a list of files from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRemoval {
    pub deleted: usize,
    /// Paths that were already gone.
    pub missing: usize,
    pub failed: Vec<String>,
}

/// Delete every path, carrying on past failures. A file that no longer
/// exists is not a failure.
pub async fn remove_files(paths: &[String]) -> FileRemoval {
    let mut removal = FileRemoval::default();
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removal.deleted += 1,
            Err(err) if err.kind() == ErrorKind::NotFound => removal.missing += 1,
            Err(err) => {
                log_warn!("Failed to delete {path}: {err}");
                removal.failed.push(path.clone());
            }
        }
    }
    removal
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionReport {
    pub removed_segments: usize,
    pub files: FileRemoval,
}

/// Remove segments (rows and files) that ended more than `retention_days`
/// before `now_ts`. Zero days disables the sweep.
pub async fn sweep_expired_segments(
    db: &Database,
    retention_days: u32,
    now_ts: i64,
) -> Result<RetentionReport> {
    if retention_days == 0 {
        return Ok(RetentionReport::default());
    }

    let cutoff = now_ts - i64::from(retention_days) * SECS_PER_DAY;
    let paths = db.delete_segments_older_than(cutoff).await?;
    if paths.is_empty() {
        return Ok(RetentionReport::default());
    }

    let files = remove_files(&paths).await;
    log_info!(
        "Retention removed {} segments older than {} days ({} files deleted, {} failed)",
        paths.len(),
        retention_days,
        files.deleted,
        files.failed.len()
    );

    Ok(RetentionReport {
        removed_segments: paths.len(),
        files,
    })
}
