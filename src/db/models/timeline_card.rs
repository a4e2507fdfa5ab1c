use serde::{Deserialize, Serialize};

/// Stage 2 output shown on the user's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineCard {
    pub id: Option<i64>,
    pub batch_id: i64,
    pub title: String,
    pub description: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub category: String,
    /// Merged batch video (or the lone segment file) the card was derived from.
    pub video_path: Option<String>,
}

impl TimelineCard {
    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }
}
