use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ProcessingStatus;

/// One captured video file. Only `status` ever changes after insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub file_path: String,
    pub status: ProcessingStatus,
}

impl Segment {
    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }
}
