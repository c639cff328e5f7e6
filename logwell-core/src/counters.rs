//! Process-wide counters shared across the pipeline.
//!
//! Plain atomics, exposed as JSON on `/health` and as a scrape-friendly
//! text exposition on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Counters {
    /// Entries persisted to chunks.
    pub ingested_entries: AtomicU64,
    /// Entries dropped after a failed write and one retry.
    pub ingest_errors: AtomicU64,
    /// Broadcasts dropped because the hub's central channel was full.
    pub dropped_broadcasts: AtomicU64,
    /// Currently registered live subscribers.
    pub active_subscribers: AtomicU64,
    pub chunks_written: AtomicU64,
    pub chunks_deleted: AtomicU64,
    pub queries_executed: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub ingested_entries: u64,
    pub ingest_errors: u64,
    pub dropped_broadcasts: u64,
    pub active_subscribers: u64,
    pub chunks_written: u64,
    pub chunks_deleted: u64,
    pub queries_executed: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ingested_entries: self.ingested_entries.load(Ordering::Relaxed),
            ingest_errors: self.ingest_errors.load(Ordering::Relaxed),
            dropped_broadcasts: self.dropped_broadcasts.load(Ordering::Relaxed),
            active_subscribers: self.active_subscribers.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            chunks_deleted: self.chunks_deleted.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
        }
    }

    /// Prometheus-style text exposition.
    pub fn render_text(&self) -> String {
        let snap = self.snapshot();
        let mut out = String::new();
        let mut counter = |name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP logwell_{name} {help}\n# TYPE logwell_{name} counter\nlogwell_{name} {value}\n"
            ));
        };
        counter(
            "ingested_entries_total",
            "Entries persisted to chunk storage.",
            snap.ingested_entries,
        );
        counter(
            "ingest_errors_total",
            "Entries dropped after a failed write and retry.",
            snap.ingest_errors,
        );
        counter(
            "dropped_broadcasts_total",
            "Broadcasts dropped at the hub's central channel.",
            snap.dropped_broadcasts,
        );
        counter(
            "chunks_written_total",
            "Chunk files sealed.",
            snap.chunks_written,
        );
        counter(
            "chunks_deleted_total",
            "Chunk files removed by the retention sweeper.",
            snap.chunks_deleted,
        );
        counter(
            "queries_executed_total",
            "Queries served by the executor.",
            snap.queries_executed,
        );
        out.push_str(&format!(
            "# HELP logwell_active_subscribers Live stream subscribers currently registered.\n# TYPE logwell_active_subscribers gauge\nlogwell_active_subscribers {}\n",
            snap.active_subscribers
        ));
        out
    }
}
