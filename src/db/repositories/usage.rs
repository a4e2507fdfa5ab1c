use anyhow::{Context, Result};
use rusqlite::params;

use crate::db::{
    connection::Database,
    models::{UsageRecord, UsageSummary},
};

impl Database {
    pub async fn record_usage(&self, usage: &UsageRecord) -> Result<()> {
        let record = usage.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO token_usage
                    (request_type, model, prompt_tokens, completion_tokens, total_tokens, batch_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.request_type.as_str(),
                    record.model,
                    record.prompt_tokens,
                    record.completion_tokens,
                    record.total_tokens,
                    record.batch_id,
                ],
            )
            .with_context(|| "failed to record token usage")?;
            Ok(())
        })
        .await
    }

    /// Token totals for a `YYYY-MM-DD` day, keyed on the row's insert time.
    pub async fn usage_summary_for_day(&self, day: &str) -> Result<UsageSummary> {
        let day = day.to_string();
        self.execute(move |conn| {
            let summary = conn.query_row(
                "SELECT
                    COALESCE(SUM(prompt_tokens), 0),
                    COALESCE(SUM(completion_tokens), 0),
                    COALESCE(SUM(total_tokens), 0),
                    COUNT(*)
                 FROM token_usage
                 WHERE DATE(created_at) = ?1",
                params![day],
                |row| {
                    Ok(UsageSummary {
                        prompt_tokens: row.get(0)?,
                        completion_tokens: row.get(1)?,
                        total_tokens: row.get(2)?,
                        request_count: row.get(3)?,
                    })
                },
            )?;
            Ok(summary)
        })
        .await
    }

    pub async fn usage_for_batch(&self, batch_id: i64) -> Result<UsageSummary> {
        self.execute(move |conn| {
            let summary = conn.query_row(
                "SELECT
                    COALESCE(SUM(prompt_tokens), 0),
                    COALESCE(SUM(completion_tokens), 0),
                    COALESCE(SUM(total_tokens), 0),
                    COUNT(*)
                 FROM token_usage
                 WHERE batch_id = ?1",
                params![batch_id],
                |row| {
                    Ok(UsageSummary {
                        prompt_tokens: row.get(0)?,
                        completion_tokens: row.get(1)?,
                        total_tokens: row.get(2)?,
                        request_count: row.get(3)?,
                    })
                },
            )?;
            Ok(summary)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RequestType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn usage_sums_for_today() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("workday.db")).unwrap();

        for (request_type, prompt, completion) in [
            (RequestType::Transcribe, 1_000, 200),
            (RequestType::GenerateCards, 300, 100),
        ] {
            db.record_usage(&UsageRecord {
                request_type,
                model: "vision".into(),
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
                batch_id: None,
            })
            .await
            .unwrap();
        }

        // created_at is written by SQLite in UTC.
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let summary = db.usage_summary_for_day(&today).await.unwrap();
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.total_tokens, 1_600);

        let empty = db.usage_summary_for_day("1999-01-01").await.unwrap();
        assert_eq!(empty, UsageSummary::default());
    }
}
