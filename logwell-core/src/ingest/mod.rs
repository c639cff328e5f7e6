//! Buffered ingest pipeline: accept, buffer, batch, persist, index,
//! broadcast.
//!
//! The accept stage validates payloads, assigns monotonic ids and
//! enqueues entries onto one bounded channel; a router task fans them out
//! to per-stream batcher tasks. Backpressure is fail-fast at the accept
//! boundary so the HTTP layer can answer 429 instead of stalling.

mod batcher;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use logwell_config::{IngestConfig, StorageConfig};
use logwell_model::{LabelSet, LogEntry, PushRequest, StreamId};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::counters::Counters;
use crate::error::{CoreError, Result};
use crate::hub::StreamHub;
use crate::index::LabelIndex;
use crate::storage::ChunkWriter;

use batcher::{run_batcher, FlushContext};

#[derive(Debug)]
pub struct Ingestor {
    // Taken on shutdown; a missing sender means we are draining.
    tx: RwLock<Option<mpsc::Sender<LogEntry>>>,
    next_id: AtomicU64,
    counters: Arc<Counters>,
    router: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Ingestor {
    /// Spawn the router and return the accept handle.
    pub fn spawn(
        ingest: &IngestConfig,
        storage: &StorageConfig,
        writer: Arc<ChunkWriter>,
        index: Arc<LabelIndex>,
        hub: Arc<StreamHub>,
        counters: Arc<Counters>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(ingest.buffer_size.max(1));
        let ctx = Arc::new(FlushContext {
            writer,
            index,
            hub,
            counters: counters.clone(),
            flush_slots: tokio::sync::Semaphore::new(ingest.workers.max(1)),
            max_batch_size: ingest.max_batch_size.max(1),
            max_batch_bytes: usize::try_from(storage.chunk_size_bytes).unwrap_or(usize::MAX),
            flush_interval: ingest.flush_interval(),
        });
        let batcher_capacity = ingest.max_batch_size.clamp(1, 1024);
        let router = tokio::spawn(route_loop(rx, ctx, batcher_capacity));

        // Ids survive restarts by seeding from the wall clock; they only
        // need to be monotonic, not dense.
        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        Arc::new(Self {
            tx: RwLock::new(Some(tx)),
            next_id: AtomicU64::new(seed),
            counters,
            router: tokio::sync::Mutex::new(Some(router)),
        })
    }

    /// Validate and enqueue a push request, returning how many entries
    /// were accepted.
    ///
    /// Validation happens before anything is enqueued, so a rejected
    /// request has no side effects. A full buffer fails fast with
    /// [`CoreError::BufferFull`]; entries enqueued before the failure
    /// still flow through the pipeline (at-least-once boundary).
    pub fn accept(&self, request: PushRequest) -> Result<usize> {
        if request.streams.is_empty() {
            return Err(CoreError::Validation("no streams in request".into()));
        }

        let now = Utc::now();
        let mut staged = Vec::new();
        for stream in request.streams {
            let labels = LabelSet::try_from_pairs_non_empty(stream.labels)?;
            if stream.entries.is_empty() {
                return Err(CoreError::Validation(format!(
                    "stream {labels} has no entries"
                )));
            }
            for entry in stream.entries {
                if entry.line.is_empty() {
                    return Err(CoreError::Validation("empty log line".into()));
                }
                staged.push((labels.clone(), entry.ts.unwrap_or(now), entry.line));
            }
        }

        let guard = self.tx.read().expect("ingest sender lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(CoreError::ShuttingDown);
        };

        let mut accepted = 0;
        for (labels, timestamp, line) in staged {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let entry = LogEntry {
                id,
                timestamp,
                line,
                labels,
            };
            match tx.try_send(entry) {
                Ok(()) => accepted += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(accepted, "ingest buffer full, rejecting request");
                    return Err(CoreError::BufferFull);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(CoreError::ShuttingDown);
                }
            }
        }
        Ok(accepted)
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Stop accepting, drain the buffer and force-flush every batcher.
    ///
    /// Resolves once all pending entries have been offered to storage;
    /// callers bound the wait with their shutdown budget.
    pub async fn drain(&self) {
        let tx = self
            .tx
            .write()
            .expect("ingest sender lock poisoned")
            .take();
        drop(tx);

        let handle = self.router.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "ingest router ended abnormally");
            }
        }
        info!("ingest pipeline drained");
    }
}

async fn route_loop(
    mut rx: mpsc::Receiver<LogEntry>,
    ctx: Arc<FlushContext>,
    batcher_capacity: usize,
) {
    let mut batchers: HashMap<StreamId, mpsc::Sender<LogEntry>> = HashMap::new();
    let mut tasks = JoinSet::new();

    while let Some(entry) = rx.recv().await {
        let stream = entry.labels.stream_id();
        let tx = batchers.entry(stream.clone()).or_insert_with(|| {
            let (tx, batcher_rx) = mpsc::channel(batcher_capacity);
            tasks.spawn(run_batcher(entry.labels.clone(), batcher_rx, ctx.clone()));
            tx
        });
        if tx.send(entry).await.is_err() {
            // A batcher only goes away by panicking; drop the entry and
            // evict the sender so the next one respawns the stream.
            warn!(stream = %stream, "batcher channel closed unexpectedly");
            ctx.counters.ingest_errors.fetch_add(1, Ordering::Relaxed);
            batchers.remove(&stream);
        }
    }

    // Accept side closed: closing the batcher channels forces the final
    // flushes, then wait for all of them.
    drop(batchers);
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubOptions, StreamHub};
    use crate::storage::{ChunkReader, TimeRange};
    use chrono::DateTime;
    use logwell_model::PushEntry;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn push_request(streams: &[(&[(&str, &str)], &[&str])]) -> PushRequest {
        PushRequest {
            streams: streams
                .iter()
                .map(|(labels, lines)| logwell_model::PushStream {
                    labels: labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                    entries: lines
                        .iter()
                        .map(|line| PushEntry {
                            ts: None,
                            line: line.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    struct Pipeline {
        ingestor: Arc<Ingestor>,
        hub: Arc<StreamHub>,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    }

    fn pipeline(root: &Path, ingest_cfg: IngestConfig) -> Pipeline {
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();
        let (hub, _hub_task) = StreamHub::spawn(
            HubOptions::default(),
            counters.clone(),
            cancel.clone(),
        );
        let writer =
            Arc::new(ChunkWriter::new(root, false, counters.clone()).unwrap());
        let index = Arc::new(LabelIndex::new());
        let ingestor = Ingestor::spawn(
            &ingest_cfg,
            &StorageConfig::default(),
            writer,
            index,
            hub.clone(),
            counters.clone(),
        );
        Pipeline {
            ingestor,
            hub,
            counters,
            cancel,
        }
    }

    fn wide_range() -> TimeRange {
        TimeRange {
            start: DateTime::from_timestamp_nanos(0),
            end: DateTime::from_timestamp_nanos(i64::MAX),
        }
    }

    #[tokio::test]
    async fn accepted_entries_reach_disk_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            buffer_size: 100,
            flush_interval_ms: 3_600_000,
            max_batch_size: 3,
            workers: 2,
        };
        let p = pipeline(dir.path(), cfg);

        let accepted = p
            .ingestor
            .accept(push_request(&[(
                &[("service", "api")],
                &["one", "two", "three"],
            )]))
            .unwrap();
        assert_eq!(accepted, 3);

        // max_batch_size reached; the flush happens without the timer.
        tokio::time::timeout(Duration::from_secs(2), async {
            while p.counters.snapshot().ingested_entries < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("batch never flushed");

        let labels = LabelSet::try_from_pairs([("service", "api")]).unwrap();
        let reader = ChunkReader::new(dir.path());
        let entries: Vec<LogEntry> = reader.enumerate(&labels.stream_id(), wide_range()).collect();
        let lines: Vec<&str> = entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["one", "two", "three"]);

        // Ids are strictly increasing in submission order.
        assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
        p.cancel.cancel();
    }

    #[tokio::test]
    async fn full_buffer_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            buffer_size: 1,
            flush_interval_ms: 3_600_000,
            max_batch_size: 1_000,
            workers: 1,
        };
        let p = pipeline(dir.path(), cfg);

        // Single-threaded test runtime: the router cannot drain between
        // these two calls, so the second entry meets a full channel.
        let first = p
            .ingestor
            .accept(push_request(&[(&[("service", "api")], &["a"])]));
        assert!(first.is_ok());
        let second = p
            .ingestor
            .accept(push_request(&[(&[("service", "api")], &["b"])]));
        assert!(matches!(second, Err(CoreError::BufferFull)));
        p.cancel.cancel();
    }

    #[tokio::test]
    async fn drain_force_flushes_pending_batches() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            buffer_size: 100,
            flush_interval_ms: 3_600_000,
            max_batch_size: 1_000,
            workers: 2,
        };
        let p = pipeline(dir.path(), cfg);

        p.ingestor
            .accept(push_request(&[
                (&[("service", "api")], &["a", "b"]),
                (&[("service", "db")], &["c"]),
            ]))
            .unwrap();

        // Neither size nor timer threshold is reachable; only the drain
        // can flush these.
        p.ingestor.drain().await;
        assert_eq!(p.counters.snapshot().ingested_entries, 3);

        let reader = ChunkReader::new(dir.path());
        let api = LabelSet::try_from_pairs([("service", "api")]).unwrap();
        let db = LabelSet::try_from_pairs([("service", "db")]).unwrap();
        assert_eq!(reader.enumerate(&api.stream_id(), wide_range()).count(), 2);
        assert_eq!(reader.enumerate(&db.stream_id(), wide_range()).count(), 1);

        // Draining twice is harmless, accepting afterwards is refused.
        p.ingestor.drain().await;
        assert!(matches!(
            p.ingestor
                .accept(push_request(&[(&[("service", "api")], &["x"])])),
            Err(CoreError::ShuttingDown)
        ));
        p.cancel.cancel();
    }

    #[tokio::test]
    async fn validation_failures_have_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), IngestConfig::default());

        // Empty label set.
        assert!(matches!(
            p.ingestor.accept(push_request(&[(&[], &["x"])])),
            Err(CoreError::Labels(_))
        ));
        // Empty line, second stream: the valid first stream must not be
        // partially enqueued.
        assert!(matches!(
            p.ingestor.accept(push_request(&[
                (&[("service", "api")], &["ok"]),
                (&[("service", "db")], &[""]),
            ])),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            p.ingestor.accept(PushRequest { streams: vec![] }),
            Err(CoreError::Validation(_))
        ));

        p.ingestor.drain().await;
        assert_eq!(p.counters.snapshot().ingested_entries, 0);
        p.cancel.cancel();
    }

    #[tokio::test]
    async fn persisted_batches_fan_out_to_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            buffer_size: 100,
            flush_interval_ms: 50,
            max_batch_size: 1_000,
            workers: 2,
        };
        let p = pipeline(dir.path(), cfg);

        let api_filter = LabelSet::try_from_pairs([("service", "api")]).unwrap();
        let mut sub = p.hub.subscribe(api_filter);

        p.ingestor
            .accept(push_request(&[
                (&[("service", "api")], &["seen"]),
                (&[("service", "db")], &["unseen"]),
            ]))
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match sub.rx.recv().await.expect("subscription closed") {
                    crate::hub::StreamMessage::Entry(entry) => break entry,
                    crate::hub::StreamMessage::Ping => continue,
                }
            }
        })
        .await
        .expect("no entry fanned out");
        assert_eq!(received.line, "seen");
        p.cancel.cancel();
    }

    #[tokio::test]
    async fn failed_writes_are_counted_and_dropped() {
        let dir = tempfile::tempdir().unwrap();
        // Occupy the stream directory name with a file so chunk writes
        // cannot create it.
        std::fs::write(dir.path().join("service=api"), "roadblock").unwrap();

        let cfg = IngestConfig {
            buffer_size: 100,
            flush_interval_ms: 3_600_000,
            max_batch_size: 2,
            workers: 1,
        };
        let p = pipeline(dir.path(), cfg);

        p.ingestor
            .accept(push_request(&[(&[("service", "api")], &["a", "b"])]))
            .unwrap();
        p.ingestor.drain().await;

        let snap = p.counters.snapshot();
        assert_eq!(snap.ingest_errors, 2);
        assert_eq!(snap.ingested_entries, 0);
        p.cancel.cancel();
    }
}
