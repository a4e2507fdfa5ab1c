use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    models::{ClearedRows, ProcessingStatus, TableCounts},
};

fn count(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
}

fn table_counts(conn: &Connection) -> Result<TableCounts, rusqlite::Error> {
    Ok(TableCounts {
        segments: count(conn, "recording_chunks")?,
        batches: count(conn, "batches")?,
        observations: count(conn, "observations")?,
        timeline_cards: count(conn, "timeline_cards")?,
        token_usage: count(conn, "token_usage")?,
    })
}

impl Database {
    pub async fn stats(&self) -> Result<TableCounts> {
        self.execute(|conn| Ok(table_counts(conn)?)).await
    }

    /// Wipe every pipeline table except `config` in one transaction. When
    /// `collect_files` is set, the segment files and card videos the rows
    /// referenced are returned (deduplicated) for the caller to delete.
    pub async fn clear_all_data(&self, collect_files: bool) -> Result<ClearedRows> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let deleted = table_counts(&tx)?;

            let file_paths = if collect_files {
                let mut stmt = tx.prepare(
                    "SELECT file_path FROM recording_chunks
                     UNION
                     SELECT video_path FROM timeline_cards WHERE video_path IS NOT NULL",
                )?;
                let paths = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                paths
            } else {
                Vec::new()
            };

            for table in [
                "timeline_cards",
                "observations",
                "token_usage",
                "batches",
                "recording_chunks",
            ] {
                tx.execute(&format!("DELETE FROM {table}"), [])
                    .with_context(|| format!("failed to clear {table}"))?;
            }
            tx.commit().with_context(|| "failed to commit data clear")?;

            Ok(ClearedRows {
                deleted,
                file_paths,
            })
        })
        .await
    }

    /// Undo what a crash mid-pass leaves behind: batches stuck in `processing`
    /// become `failed`, segments stuck in `processing` go back to `pending`.
    /// Returns `(failed_batches, requeued_segments)`.
    pub async fn recover_interrupted_work(&self) -> Result<(usize, usize)> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let batches = tx.execute(
                "UPDATE batches SET status = ?1 WHERE status = ?2",
                params![
                    ProcessingStatus::Failed.as_str(),
                    ProcessingStatus::Processing.as_str()
                ],
            )?;
            let segments = tx.execute(
                "UPDATE recording_chunks SET status = ?1 WHERE status = ?2",
                params![
                    ProcessingStatus::Pending.as_str(),
                    ProcessingStatus::Processing.as_str()
                ],
            )?;
            tx.commit()
                .with_context(|| "failed to recover interrupted work")?;
            Ok((batches, segments))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Batch, Observation, RequestType, TimelineCard, UsageRecord};
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, Database, i64) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("workday.db")).unwrap();

        let segment = db.insert_segment(0, 15, "/r/chunk_0.mp4").await.unwrap();
        db.insert_segment(15, 30, "/r/chunk_1.mp4").await.unwrap();
        let batch_id = db
            .insert_batch(&Batch {
                id: None,
                day: "2025-01-01".into(),
                start_ts: 0,
                end_ts: 30,
                status: ProcessingStatus::Processing,
            })
            .await
            .unwrap();
        db.update_segment_status(segment, ProcessingStatus::Processing)
            .await
            .unwrap();
        db.insert_observations(&[Observation {
            id: None,
            batch_id,
            start_ts: 0,
            end_ts: 30,
            observation: "typing".into(),
        }])
        .await
        .unwrap();
        db.insert_timeline_card(&TimelineCard {
            id: None,
            batch_id,
            title: "Typing".into(),
            description: String::new(),
            start_ts: 0,
            end_ts: 30,
            category: "工作".into(),
            video_path: Some("/r/batch_20250101_000000.mp4".into()),
        })
        .await
        .unwrap();
        db.record_usage(&UsageRecord {
            request_type: RequestType::Transcribe,
            model: "vision".into(),
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            batch_id: Some(batch_id),
        })
        .await
        .unwrap();
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('capture_fps', '1')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        (dir, db, batch_id)
    }

    #[tokio::test]
    async fn clear_removes_pipeline_rows_but_keeps_config() {
        let (_dir, db, _) = seeded().await;

        let cleared = db.clear_all_data(true).await.unwrap();
        assert_eq!(
            cleared.deleted,
            TableCounts {
                segments: 2,
                batches: 1,
                observations: 1,
                timeline_cards: 1,
                token_usage: 1,
            }
        );
        let mut paths = cleared.file_paths;
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "/r/batch_20250101_000000.mp4".to_string(),
                "/r/chunk_0.mp4".to_string(),
                "/r/chunk_1.mp4".to_string(),
            ]
        );

        assert_eq!(db.stats().await.unwrap(), TableCounts::default());
        let config_rows: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM config", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(config_rows, 1);
    }

    #[tokio::test]
    async fn clear_without_file_collection_returns_no_paths() {
        let (_dir, db, _) = seeded().await;
        let cleared = db.clear_all_data(false).await.unwrap();
        assert!(cleared.file_paths.is_empty());
        assert_eq!(cleared.deleted.segments, 2);
    }

    #[tokio::test]
    async fn recovery_fails_stuck_batches_and_requeues_segments() {
        let (_dir, db, batch_id) = seeded().await;

        let (batches, segments) = db.recover_interrupted_work().await.unwrap();
        assert_eq!((batches, segments), (1, 1));
        assert_eq!(
            db.get_batch(batch_id).await.unwrap().unwrap().status,
            ProcessingStatus::Failed
        );
        assert_eq!(db.list_pending_segments(10).await.unwrap().len(), 2);
    }
}
