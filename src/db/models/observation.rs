use serde::{Deserialize, Serialize};

/// Stage 1 output: what happened during one sub-interval of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: Option<i64>,
    pub batch_id: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub observation: String,
}
