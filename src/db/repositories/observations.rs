use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{connection::Database, models::Observation};

fn row_to_observation(row: &Row) -> Result<Observation, rusqlite::Error> {
    Ok(Observation {
        id: Some(row.get("id")?),
        batch_id: row.get("batch_id")?,
        start_ts: row.get("start_ts")?,
        end_ts: row.get("end_ts")?,
        observation: row.get("observation")?,
    })
}

impl Database {
    /// Bulk insert a batch's Stage 1 output in one transaction.
    pub async fn insert_observations(&self, observations: &[Observation]) -> Result<()> {
        let observations = observations.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO observations (batch_id, start_ts, end_ts, observation)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for observation in &observations {
                    stmt.execute(params![
                        observation.batch_id,
                        observation.start_ts,
                        observation.end_ts,
                        observation.observation,
                    ])?;
                }
            }
            tx.commit()
                .with_context(|| "failed to insert observations")?;
            Ok(())
        })
        .await
    }

    pub async fn observations_for_batch(&self, batch_id: i64) -> Result<Vec<Observation>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, batch_id, start_ts, end_ts, observation
                 FROM observations
                 WHERE batch_id = ?1
                 ORDER BY start_ts ASC",
            )?;

            let observations = stmt
                .query_map(params![batch_id], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(observations)
        })
        .await
    }

    /// Drop a batch's Stage 1 output before it is re-run. Returns the row count.
    pub async fn delete_observations_for_batch(&self, batch_id: i64) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM observations WHERE batch_id = ?1",
                    params![batch_id],
                )
                .with_context(|| format!("failed to delete observations of batch {batch_id}"))?;
            Ok(removed)
        })
        .await
    }

    pub async fn observations_in_range(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Observation>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, batch_id, start_ts, end_ts, observation
                 FROM observations
                 WHERE start_ts >= ?1 AND end_ts <= ?2
                 ORDER BY start_ts ASC",
            )?;

            let observations = stmt
                .query_map(params![start_ts, end_ts], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(observations)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Batch, ProcessingStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn observations_are_scoped_to_their_batch() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("workday.db")).unwrap();

        let mut ids = Vec::new();
        for start_ts in [0, 900] {
            ids.push(
                db.insert_batch(&Batch {
                    id: None,
                    day: "2025-01-01".into(),
                    start_ts,
                    end_ts: start_ts + 900,
                    status: ProcessingStatus::Processing,
                })
                .await
                .unwrap(),
            );
        }

        let observation = |batch_id: i64, start_ts: i64, text: &str| Observation {
            id: None,
            batch_id,
            start_ts,
            end_ts: start_ts + 300,
            observation: text.into(),
        };
        db.insert_observations(&[
            observation(ids[0], 300, "reading"),
            observation(ids[0], 0, "writing"),
            observation(ids[1], 900, "browsing"),
        ])
        .await
        .unwrap();

        let first: Vec<String> = db
            .observations_for_batch(ids[0])
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.observation)
            .collect();
        assert_eq!(first, vec!["writing", "reading"]);
        assert_eq!(db.observations_in_range(0, 1_800).await.unwrap().len(), 3);

        assert_eq!(db.delete_observations_for_batch(ids[0]).await.unwrap(), 2);
        assert!(db.observations_for_batch(ids[0]).await.unwrap().is_empty());
        assert_eq!(db.observations_for_batch(ids[1]).await.unwrap().len(), 1);
    }
}
