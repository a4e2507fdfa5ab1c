use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{connection::Database, models::TimelineCard};

fn row_to_card(row: &Row) -> Result<TimelineCard, rusqlite::Error> {
    Ok(TimelineCard {
        id: Some(row.get("id")?),
        batch_id: row.get("batch_id")?,
        title: row.get("title")?,
        description: row
            .get::<_, Option<String>>("description")?
            .unwrap_or_default(),
        start_ts: row.get("start_ts")?,
        end_ts: row.get("end_ts")?,
        category: row.get::<_, Option<String>>("category")?.unwrap_or_default(),
        video_path: row.get("video_path")?,
    })
}

impl Database {
    pub async fn insert_timeline_card(&self, card: &TimelineCard) -> Result<i64> {
        let record = card.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO timeline_cards
                    (batch_id, title, description, start_ts, end_ts, category, video_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.batch_id,
                    record.title,
                    record.description,
                    record.start_ts,
                    record.end_ts,
                    record.category,
                    record.video_path,
                ],
            )
            .with_context(|| "failed to insert timeline card")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn timeline_card(&self, card_id: i64) -> Result<Option<TimelineCard>> {
        self.execute(move |conn| {
            let card = conn
                .query_row(
                    "SELECT id, batch_id, title, description, start_ts, end_ts, category, video_path
                     FROM timeline_cards
                     WHERE id = ?1",
                    params![card_id],
                    row_to_card,
                )
                .optional()?;
            Ok(card)
        })
        .await
    }

    /// Cards whose owning batch belongs to `day`.
    pub async fn timeline_cards_for_day(&self, day: &str) -> Result<Vec<TimelineCard>> {
        let day = day.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tc.id AS id, tc.batch_id AS batch_id, tc.title AS title,
                        tc.description AS description, tc.start_ts AS start_ts,
                        tc.end_ts AS end_ts, tc.category AS category, tc.video_path AS video_path
                 FROM timeline_cards tc
                 JOIN batches b ON tc.batch_id = b.id
                 WHERE b.day = ?1
                 ORDER BY tc.start_ts ASC",
            )?;

            let cards = stmt
                .query_map(params![day], row_to_card)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(cards)
        })
        .await
    }

    pub async fn timeline_cards_in_range(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TimelineCard>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, batch_id, title, description, start_ts, end_ts, category, video_path
                 FROM timeline_cards
                 WHERE start_ts >= ?1 AND end_ts <= ?2
                 ORDER BY start_ts ASC",
            )?;

            let cards = stmt
                .query_map(params![start_ts, end_ts], row_to_card)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(cards)
        })
        .await
    }

    /// Delete every card of `day` and return the merged videos they referenced.
    /// Paths that are still a live segment's source file are left out so the
    /// caller never deletes footage a reprocess needs.
    pub async fn delete_timeline_cards_by_day(&self, day: &str) -> Result<Vec<String>> {
        let day = day.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let video_paths = {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT tc.video_path
                     FROM timeline_cards tc
                     JOIN batches b ON tc.batch_id = b.id
                     WHERE b.day = ?1
                       AND tc.video_path IS NOT NULL
                       AND tc.video_path NOT IN (SELECT file_path FROM recording_chunks)",
                )?;
                let paths = stmt
                    .query_map(params![day], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                paths
            };

            tx.execute(
                "DELETE FROM timeline_cards
                 WHERE batch_id IN (SELECT id FROM batches WHERE day = ?1)",
                params![day],
            )?;
            tx.commit()
                .with_context(|| "failed to delete timeline cards")?;

            Ok(video_paths)
        })
        .await
    }
}
