//! Query executor: selector in, sorted entries out.
//!
//! Positive matchers resolve against the label index; negative matchers
//! narrow the candidate streams before any chunk is opened (a stream's
//! entries all carry the stream's labels, so stream-level filtering is
//! equivalent to entry-level filtering and much cheaper). Chunk decoding
//! runs on the blocking pool and observes cancellation at stream
//! boundaries.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use logwell_model::{QueryResult, QueryStats, Selector};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::counters::Counters;
use crate::error::{CoreError, Result};
use crate::index::LabelIndex;
use crate::storage::{ChunkReader, TimeRange};

/// Hard ceiling applied to every query regardless of the requested limit.
pub const HARD_QUERY_LIMIT: usize = 10_000;

/// Window applied to a range query that names no start: the last hour.
pub const DEFAULT_RANGE_WINDOW_SECS: i64 = 60 * 60;

/// Window applied to an instant query: the last five minutes.
pub const DEFAULT_INSTANT_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug)]
pub struct QueryExecutor {
    index: Arc<LabelIndex>,
    reader: ChunkReader,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl QueryExecutor {
    pub fn new(
        index: Arc<LabelIndex>,
        reader: ChunkReader,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            reader,
            counters,
            cancel,
        }
    }

    /// Run a range query. A missing end defaults to now, a missing start
    /// to one hour before the end. `limit <= 0` means unlimited, bounded
    /// by [`HARD_QUERY_LIMIT`].
    pub async fn execute(
        &self,
        selector_text: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<QueryResult> {
        let end = end.unwrap_or_else(Utc::now);
        let start =
            start.unwrap_or(end - ChronoDuration::seconds(DEFAULT_RANGE_WINDOW_SECS));
        self.run(selector_text, start, end, limit).await
    }

    /// Run an instant query: the five minutes leading up to `at`
    /// (defaulting to now).
    pub async fn execute_instant(
        &self,
        selector_text: &str,
        at: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<QueryResult> {
        let end = at.unwrap_or_else(Utc::now);
        let start = end - ChronoDuration::seconds(DEFAULT_INSTANT_WINDOW_SECS);
        self.run(selector_text, start, end, limit).await
    }

    async fn run(
        &self,
        selector_text: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let selector = Selector::parse(selector_text)?;
        let range = TimeRange::new(start, end)?;

        let candidates: Vec<_> = self
            .index
            .resolve(&selector)
            .into_iter()
            .filter(|id| {
                self.index
                    .labels_of(id)
                    .is_some_and(|labels| selector.matches(&labels))
            })
            .collect();

        self.counters.queries_executed.fetch_add(1, Ordering::Relaxed);

        if candidates.is_empty() {
            return Ok(QueryResult {
                logs: Vec::new(),
                stats: QueryStats {
                    scanned_lines: 0,
                    matched_lines: 0,
                    execution_time: format!("{:?}", started.elapsed()),
                },
            });
        }

        let reader = self.reader.clone();
        let cancel = self.cancel.clone();
        let (mut logs, scanned) = tokio::task::spawn_blocking(move || {
            let mut logs = Vec::new();
            let mut scanned = 0u64;
            for stream in &candidates {
                if cancel.is_cancelled() {
                    return Err(CoreError::ShuttingDown);
                }
                let mut entries = reader.enumerate(stream, range);
                logs.extend(entries.by_ref());
                scanned += entries.scanned();
            }
            Ok((logs, scanned))
        })
        .await
        .map_err(|err| CoreError::Internal(format!("query task failed: {err}")))??;

        logs.sort_by_key(|entry| entry.sort_key());
        let matched = logs.len() as u64;
        logs.truncate(effective_limit(limit));

        let stats = QueryStats {
            scanned_lines: scanned,
            matched_lines: matched,
            execution_time: format!("{:?}", started.elapsed()),
        };
        debug!(
            selector = selector_text,
            scanned = stats.scanned_lines,
            matched = stats.matched_lines,
            "query executed"
        );
        Ok(QueryResult { logs, stats })
    }
}

pub(crate) fn effective_limit(limit: i64) -> usize {
    if limit <= 0 {
        HARD_QUERY_LIMIT
    } else {
        usize::try_from(limit)
            .unwrap_or(HARD_QUERY_LIMIT)
            .min(HARD_QUERY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ChunkWriter;
    use logwell_model::{LabelSet, LogEntry, SelectorError};
    use std::path::Path;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        LabelSet::try_from_pairs(pairs.iter().copied()).unwrap()
    }

    fn entry(id: u64, nanos: i64, line: &str, set: &LabelSet) -> LogEntry {
        LogEntry {
            id,
            timestamp: DateTime::from_timestamp_nanos(nanos),
            line: line.to_string(),
            labels: set.clone(),
        }
    }

    async fn seeded_executor(root: &Path) -> QueryExecutor {
        let counters = Arc::new(Counters::default());
        let writer = ChunkWriter::new(root, false, counters.clone()).unwrap();
        let index = Arc::new(LabelIndex::new());

        let api = labels(&[("service", "api"), ("env", "prod")]);
        let db = labels(&[("service", "db"), ("env", "prod")]);
        writer
            .write_chunk(&api, &[entry(1, 100, "api-1", &api), entry(3, 300, "api-3", &api)])
            .await
            .unwrap();
        writer
            .write_chunk(&db, &[entry(2, 200, "db-2", &db)])
            .await
            .unwrap();
        index.register(&api);
        index.register(&db);

        QueryExecutor::new(
            index,
            ChunkReader::new(root),
            counters,
            CancellationToken::new(),
        )
    }

    fn at(nanos: i64) -> Option<DateTime<Utc>> {
        Some(DateTime::from_timestamp_nanos(nanos))
    }

    #[tokio::test]
    async fn merges_streams_sorted_by_timestamp_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        let result = executor.execute("{}", at(0), at(1_000), 0).await.unwrap();
        let lines: Vec<&str> = result.logs.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["api-1", "db-2", "api-3"]);
        assert_eq!(result.stats.matched_lines, 3);
        assert_eq!(result.stats.scanned_lines, 3);
    }

    #[tokio::test]
    async fn selector_narrows_to_matching_streams() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        let result = executor
            .execute(r#"{service="api"}"#, at(0), at(1_000), 0)
            .await
            .unwrap();
        assert!(result.logs.iter().all(|e| e.labels.get("service") == Some("api")));
        assert_eq!(result.stats.matched_lines, 2);

        let none = executor
            .execute(r#"{service="cache"}"#, at(0), at(1_000), 0)
            .await
            .unwrap();
        assert!(none.logs.is_empty());
        assert_eq!(none.stats.matched_lines, 0);
    }

    #[tokio::test]
    async fn negative_matchers_filter_streams() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        let result = executor
            .execute(r#"{env="prod", service!="db"}"#, at(0), at(1_000), 0)
            .await
            .unwrap();
        let lines: Vec<&str> = result.logs.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["api-1", "api-3"]);
    }

    #[tokio::test]
    async fn limit_truncates_after_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        let result = executor.execute("{}", at(0), at(1_000), 2).await.unwrap();
        let lines: Vec<&str> = result.logs.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["api-1", "db-2"]);
        // matched counts pre-truncation matches.
        assert_eq!(result.stats.matched_lines, 3);
    }

    #[tokio::test]
    async fn window_bounds_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        let result = executor.execute("{}", at(150), at(250), 0).await.unwrap();
        let lines: Vec<&str> = result.logs.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["db-2"]);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;
        assert!(matches!(
            executor.execute("{}", at(1_000), at(0), 0).await,
            Err(CoreError::TimeRange(_))
        ));
    }

    #[tokio::test]
    async fn selector_errors_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(dir.path()).await;

        assert!(matches!(
            executor.execute(r#"{service="api", level=}"#, at(0), at(1), 0).await,
            Err(CoreError::Selector(SelectorError::Syntax(_)))
        ));
        assert!(matches!(
            executor.execute(r#"{service=~"[invalid"}"#, at(0), at(1), 0).await,
            Err(CoreError::Selector(SelectorError::Regex(_)))
        ));
    }

    #[tokio::test]
    async fn default_window_is_the_last_hour() {
        let dir = tempfile::tempdir().unwrap();
        let counters = Arc::new(Counters::default());
        let writer = ChunkWriter::new(dir.path(), false, counters.clone()).unwrap();
        let index = Arc::new(LabelIndex::new());

        let set = labels(&[("service", "api")]);
        let recent = Utc::now() - ChronoDuration::minutes(5);
        let stale = Utc::now() - ChronoDuration::hours(2);
        writer
            .write_chunk(
                &set,
                &[
                    LogEntry {
                        id: 1,
                        timestamp: stale,
                        line: "stale".into(),
                        labels: set.clone(),
                    },
                    LogEntry {
                        id: 2,
                        timestamp: recent,
                        line: "recent".into(),
                        labels: set.clone(),
                    },
                ],
            )
            .await
            .unwrap();
        index.register(&set);

        let executor = QueryExecutor::new(
            index,
            ChunkReader::new(dir.path()),
            counters,
            CancellationToken::new(),
        );
        let result = executor.execute("{}", None, None, 0).await.unwrap();
        let lines: Vec<&str> = result.logs.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["recent"]);

        // The instant window is tighter still.
        let instant = executor.execute_instant("{}", None, 0).await.unwrap();
        assert!(instant.logs.is_empty());
    }

    #[test]
    fn effective_limit_applies_the_hard_ceiling() {
        assert_eq!(effective_limit(0), HARD_QUERY_LIMIT);
        assert_eq!(effective_limit(-5), HARD_QUERY_LIMIT);
        assert_eq!(effective_limit(10), 10);
        assert_eq!(effective_limit(1_000_000), HARD_QUERY_LIMIT);
    }
}
