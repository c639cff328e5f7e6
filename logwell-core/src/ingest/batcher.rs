//! Per-stream batcher tasks.
//!
//! Each stream gets its own task that accumulates entries until a size,
//! byte, or time threshold is hit, then seals a chunk. Flush concurrency
//! across streams is bounded by a shared semaphore; a closed inbound
//! channel forces a final flush, which is what gives shutdown its drain
//! guarantee.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use logwell_model::{LabelSet, LogEntry};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, warn};

use crate::counters::Counters;
use crate::hub::StreamHub;
use crate::index::LabelIndex;
use crate::storage::ChunkWriter;

/// Shared collaborators and thresholds for every batcher.
#[derive(Debug)]
pub(crate) struct FlushContext {
    pub writer: Arc<ChunkWriter>,
    pub index: Arc<LabelIndex>,
    pub hub: Arc<StreamHub>,
    pub counters: Arc<Counters>,
    pub flush_slots: Semaphore,
    pub max_batch_size: usize,
    pub max_batch_bytes: usize,
    pub flush_interval: Duration,
}

pub(crate) async fn run_batcher(
    labels: LabelSet,
    mut rx: mpsc::Receiver<LogEntry>,
    ctx: Arc<FlushContext>,
) {
    let mut pending: Vec<LogEntry> = Vec::new();
    let mut pending_bytes = 0usize;
    let mut ticker = tokio::time::interval(ctx.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; swallow it so the timer
    // measures a full interval from now.
    ticker.tick().await;

    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(entry) => {
                    pending_bytes += entry.line.len();
                    pending.push(entry);
                    if pending.len() >= ctx.max_batch_size
                        || pending_bytes >= ctx.max_batch_bytes
                    {
                        flush(&labels, &mut pending, &mut pending_bytes, &ctx).await;
                        ticker.reset();
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush(&labels, &mut pending, &mut pending_bytes, &ctx).await;
                }
            }
        }
    }

    // Shutdown: the channel is closed, force out whatever is left.
    if !pending.is_empty() {
        flush(&labels, &mut pending, &mut pending_bytes, &ctx).await;
    }
}

async fn flush(
    labels: &LabelSet,
    pending: &mut Vec<LogEntry>,
    pending_bytes: &mut usize,
    ctx: &FlushContext,
) {
    let batch = std::mem::take(pending);
    *pending_bytes = 0;

    let _permit = ctx
        .flush_slots
        .acquire()
        .await
        .expect("flush semaphore closed");

    let result = match ctx.writer.write_chunk(labels, &batch).await {
        Ok(meta) => Ok(meta),
        Err(err) => {
            warn!(stream = %labels, error = %err, "chunk write failed, retrying once");
            ctx.writer.write_chunk(labels, &batch).await
        }
    };

    match result {
        Ok(_) => {
            ctx.index.register(labels);
            ctx.counters
                .ingested_entries
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            for entry in batch {
                ctx.hub.broadcast(Arc::new(entry));
            }
        }
        Err(err) => {
            error!(
                stream = %labels,
                entries = batch.len(),
                error = %err,
                "dropping batch after retry"
            );
            ctx.counters
                .ingest_errors
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
    }
}
