//! Log entries and the ingest wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::labels::LabelSet;
use crate::time;

/// A single ingested log line.
///
/// `id` is assigned monotonically at ingest and is never reused, even
/// across restarts. `line` is an opaque UTF-8 payload; the core never
/// parses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    #[serde(with = "time::serde_flex")]
    pub timestamp: DateTime<Utc>,
    pub line: String,
    pub labels: LabelSet,
}

impl LogEntry {
    /// Sort key for query results: `(timestamp, id)` ascending.
    pub fn sort_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.id)
    }
}

/// Body of `POST /ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

/// One labeled batch of lines within a push request.
///
/// Labels are carried as a raw map here; validation and canonicalization
/// happen at the accept stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushStream {
    pub labels: BTreeMap<String, String>,
    pub entries: Vec<PushEntry>,
}

/// One line within a push stream. A missing `ts` is assigned the accept
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEntry {
    #[serde(default, with = "time::serde_flex_opt")]
    pub ts: Option<DateTime<Utc>>,
    pub line: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_request_accepts_both_timestamp_forms() {
        let body = r#"{
            "streams": [{
                "labels": {"service": "api"},
                "entries": [
                    {"ts": "2024-01-15T10:30:00Z", "line": "hello"},
                    {"ts": 1705314600000000000, "line": "world"},
                    {"line": "no timestamp"}
                ]
            }]
        }"#;
        let req: PushRequest = serde_json::from_str(body).unwrap();
        let entries = &req.streams[0].entries;
        assert_eq!(entries[0].ts, entries[1].ts);
        assert!(entries[2].ts.is_none());
    }

    #[test]
    fn log_entry_serializes_rfc3339_nanos() {
        let entry = LogEntry {
            id: 7,
            timestamp: DateTime::from_timestamp_nanos(1_705_314_600_000_000_001),
            line: "hello".to_string(),
            labels: LabelSet::try_from_pairs([("service", "api")]).unwrap(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["timestamp"], "2024-01-15T10:30:00.000000001Z");
        assert_eq!(json["labels"]["service"], "api");
    }
}
