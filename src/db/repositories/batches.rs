use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::status_column,
    models::{Batch, ProcessingStatus},
};

fn row_to_batch(row: &Row) -> Result<Batch, rusqlite::Error> {
    let status: String = row.get("status")?;

    Ok(Batch {
        id: Some(row.get("id")?),
        day: row.get("day")?,
        start_ts: row.get("start_ts")?,
        end_ts: row.get("end_ts")?,
        status: status_column(&status)?,
    })
}

impl Database {
    pub async fn insert_batch(&self, batch: &Batch) -> Result<i64> {
        let record = batch.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO batches (day, start_ts, end_ts, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.day,
                    record.start_ts,
                    record.end_ts,
                    record.status.as_str(),
                ],
            )
            .with_context(|| "failed to insert batch")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_batch_status(&self, batch_id: i64, status: ProcessingStatus) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE batches SET status = ?1 WHERE id = ?2",
                params![status.as_str(), batch_id],
            )
            .with_context(|| format!("failed to update status of batch {batch_id}"))?;
            Ok(())
        })
        .await
    }

    pub async fn get_batch(&self, batch_id: i64) -> Result<Option<Batch>> {
        self.execute(move |conn| {
            let batch = conn
                .query_row(
                    "SELECT id, day, start_ts, end_ts, status FROM batches WHERE id = ?1",
                    params![batch_id],
                    row_to_batch,
                )
                .optional()?;
            Ok(batch)
        })
        .await
    }

    pub async fn list_batches_by_day(&self, day: &str) -> Result<Vec<Batch>> {
        let day = day.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, day, start_ts, end_ts, status
                 FROM batches
                 WHERE day = ?1
                 ORDER BY start_ts ASC",
            )?;

            let batches = stmt
                .query_map(params![day], row_to_batch)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(batches)
        })
        .await
    }

    pub async fn pending_batches(&self) -> Result<Vec<Batch>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, day, start_ts, end_ts, status
                 FROM batches
                 WHERE status = ?1
                 ORDER BY start_ts ASC",
            )?;

            let batches = stmt
                .query_map(params![ProcessingStatus::Pending.as_str()], row_to_batch)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(batches)
        })
        .await
    }
}
