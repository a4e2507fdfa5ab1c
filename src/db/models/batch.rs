use serde::{Deserialize, Serialize};

use super::{ProcessingStatus, Segment};
use crate::db::helpers::local_day;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Option<i64>,
    /// Local calendar date of `start_ts`, `YYYY-MM-DD`.
    pub day: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub status: ProcessingStatus,
}

impl Batch {
    /// Batch covering an ordered, non-empty group of segments.
    pub fn spanning(segments: &[Segment], status: ProcessingStatus) -> Option<Self> {
        let first = segments.first()?;
        let last = segments.last()?;
        Some(Self {
            id: None,
            day: local_day(first.start_ts),
            start_ts: first.start_ts,
            end_ts: last.end_ts,
            status,
        })
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: i64, start_ts: i64, end_ts: i64) -> Segment {
        Segment {
            id,
            start_ts,
            end_ts,
            file_path: format!("/tmp/chunk_{id}.mp4"),
            status: ProcessingStatus::Pending,
        }
    }

    #[test]
    fn spans_first_start_to_last_end() {
        let group = [segment(1, 1_000, 1_015), segment(2, 1_015, 1_030), segment(3, 1_030, 1_045)];
        let batch = Batch::spanning(&group, ProcessingStatus::Processing).unwrap();
        assert_eq!(batch.start_ts, 1_000);
        assert_eq!(batch.end_ts, 1_045);
        assert_eq!(batch.day, local_day(1_000));
        assert_eq!(batch.status, ProcessingStatus::Processing);
    }

    #[test]
    fn empty_group_has_no_batch() {
        assert!(Batch::spanning(&[], ProcessingStatus::Processing).is_none());
    }
}
