use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

use crate::db::models::ProcessingStatus;

pub fn parse_status(value: &str) -> Result<ProcessingStatus> {
    match value {
        "pending" => Ok(ProcessingStatus::Pending),
        "processing" => Ok(ProcessingStatus::Processing),
        "completed" => Ok(ProcessingStatus::Completed),
        "failed" => Ok(ProcessingStatus::Failed),
        other => Err(anyhow!("unknown processing status {other}")),
    }
}

/// Adapts a status decode failure into the error type row mappers must return.
pub fn status_column(value: &str) -> Result<ProcessingStatus, rusqlite::Error> {
    parse_status(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
        )
    })
}

/// Unix seconds in the system's local timezone. Out-of-range values fall back
/// to the epoch rather than panicking.
pub fn local_datetime(ts: i64) -> DateTime<Local> {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
}

/// Local calendar date (`YYYY-MM-DD`) a timestamp falls on.
pub fn local_day(ts: i64) -> String {
    local_datetime(ts).format("%Y-%m-%d").to_string()
}
