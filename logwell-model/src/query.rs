//! Query result shapes returned by the executor and the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;

/// Execution statistics attached to every query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    /// Entries decoded from chunks within the time window.
    pub scanned_lines: u64,
    /// Entries that survived all matchers.
    pub matched_lines: u64,
    /// Wall-clock execution time, e.g. `"3.2ms"`.
    pub execution_time: String,
}

/// A materialized query result: matching entries sorted by
/// `(timestamp, id)` ascending, truncated to the effective limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub logs: Vec<LogEntry>,
    pub stats: QueryStats,
}
