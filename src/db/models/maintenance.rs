use serde::{Deserialize, Serialize};

/// Row counts across the pipeline's tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub segments: i64,
    pub batches: i64,
    pub observations: i64,
    pub timeline_cards: i64,
    pub token_usage: i64,
}

/// Result of wiping pipeline tables: what was removed plus the files the rows
/// pointed at, which the caller may delete.
#[derive(Debug, Clone, Default)]
pub struct ClearedRows {
    pub deleted: TableCounts,
    pub file_paths: Vec<String>,
}
