use anyhow::{bail, Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::status_column,
    models::{ProcessingStatus, Segment},
};

const SEGMENT_COLUMNS: &str = "id, start_ts, end_ts, file_path, status";

fn row_to_segment(row: &Row) -> Result<Segment, rusqlite::Error> {
    let status: String = row.get("status")?;

    Ok(Segment {
        id: row.get("id")?,
        start_ts: row.get("start_ts")?,
        end_ts: row.get("end_ts")?,
        file_path: row.get("file_path")?,
        status: status_column(&status)?,
    })
}

impl Database {
    /// Register a captured segment as `pending`. Normally the capture process
    /// writes these rows itself.
    pub async fn insert_segment(
        &self,
        start_ts: i64,
        end_ts: i64,
        file_path: impl Into<String>,
    ) -> Result<i64> {
        if start_ts >= end_ts {
            bail!("segment start {start_ts} must precede its end {end_ts}");
        }
        let file_path = file_path.into();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO recording_chunks (start_ts, end_ts, file_path, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    start_ts,
                    end_ts,
                    file_path,
                    ProcessingStatus::Pending.as_str()
                ],
            )
            .with_context(|| "failed to insert segment")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Oldest-first page of segments still waiting for analysis.
    pub async fn list_pending_segments(&self, limit: u32) -> Result<Vec<Segment>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEGMENT_COLUMNS}
                 FROM recording_chunks
                 WHERE status = ?1
                 ORDER BY start_ts ASC
                 LIMIT ?2"
            ))?;

            let segments = stmt
                .query_map(
                    params![ProcessingStatus::Pending.as_str(), limit],
                    row_to_segment,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(segments)
        })
        .await
    }

    pub async fn get_segment(&self, segment_id: i64) -> Result<Option<Segment>> {
        self.execute(move |conn| {
            let segment = conn
                .query_row(
                    &format!("SELECT {SEGMENT_COLUMNS} FROM recording_chunks WHERE id = ?1"),
                    params![segment_id],
                    row_to_segment,
                )
                .optional()?;
            Ok(segment)
        })
        .await
    }

    /// Segments fully contained in `[start_ts, end_ts]`, in start order.
    pub async fn segments_in_range(&self, start_ts: i64, end_ts: i64) -> Result<Vec<Segment>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEGMENT_COLUMNS}
                 FROM recording_chunks
                 WHERE start_ts >= ?1 AND end_ts <= ?2
                 ORDER BY start_ts ASC"
            ))?;

            let segments = stmt
                .query_map(params![start_ts, end_ts], row_to_segment)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(segments)
        })
        .await
    }

    pub async fn update_segment_status(
        &self,
        segment_id: i64,
        status: ProcessingStatus,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE recording_chunks SET status = ?1 WHERE id = ?2",
                params![status.as_str(), segment_id],
            )
            .with_context(|| format!("failed to update status of segment {segment_id}"))?;
            Ok(())
        })
        .await
    }

    /// Same as [`Database::update_segment_status`] for a whole group, applied
    /// in one transaction.
    pub async fn update_segments_status(
        &self,
        segment_ids: &[i64],
        status: ProcessingStatus,
    ) -> Result<()> {
        let segment_ids = segment_ids.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("UPDATE recording_chunks SET status = ?1 WHERE id = ?2")?;
                for segment_id in &segment_ids {
                    stmt.execute(params![status.as_str(), segment_id])?;
                }
            }
            tx.commit()
                .with_context(|| "failed to update segment statuses")?;
            Ok(())
        })
        .await
    }

    /// Delete segments that ended before `cutoff_ts` and return their file
    /// paths so the caller can remove the files.
    pub async fn delete_segments_older_than(&self, cutoff_ts: i64) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let file_paths = {
                let mut stmt =
                    tx.prepare("SELECT file_path FROM recording_chunks WHERE end_ts < ?1")?;
                let paths = stmt
                    .query_map(params![cutoff_ts], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                paths
            };

            tx.execute(
                "DELETE FROM recording_chunks WHERE end_ts < ?1",
                params![cutoff_ts],
            )?;
            tx.commit()
                .with_context(|| "failed to delete expired segments")?;

            Ok(file_paths)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("workday.db")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn pending_segments_come_back_oldest_first() {
        let (_dir, db) = open().await;
        let late = db.insert_segment(200, 215, "/r/late.mp4").await.unwrap();
        let early = db.insert_segment(100, 115, "/r/early.mp4").await.unwrap();
        let done = db.insert_segment(150, 165, "/r/done.mp4").await.unwrap();
        db.update_segment_status(done, ProcessingStatus::Completed)
            .await
            .unwrap();

        let pending = db.list_pending_segments(10).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![early, late]);

        let limited = db.list_pending_segments(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, early);
    }

    #[tokio::test]
    async fn rejects_inverted_segment() {
        let (_dir, db) = open().await;
        assert!(db.insert_segment(100, 100, "/r/zero.mp4").await.is_err());
    }

    #[tokio::test]
    async fn group_status_update_touches_every_member() {
        let (_dir, db) = open().await;
        let a = db.insert_segment(0, 15, "/r/a.mp4").await.unwrap();
        let b = db.insert_segment(15, 30, "/r/b.mp4").await.unwrap();

        db.update_segments_status(&[a, b], ProcessingStatus::Failed)
            .await
            .unwrap();

        for id in [a, b] {
            let segment = db.get_segment(id).await.unwrap().unwrap();
            assert_eq!(segment.status, ProcessingStatus::Failed);
        }
    }

    #[tokio::test]
    async fn expired_segments_are_removed_with_their_paths() {
        let (_dir, db) = open().await;
        db.insert_segment(0, 15, "/r/old.mp4").await.unwrap();
        let fresh = db.insert_segment(1_000, 1_015, "/r/new.mp4").await.unwrap();

        let removed = db.delete_segments_older_than(500).await.unwrap();
        assert_eq!(removed, vec!["/r/old.mp4".to_string()]);

        let remaining = db.segments_in_range(0, 10_000).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh);
    }
}
