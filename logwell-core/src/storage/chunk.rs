//! On-disk chunk layout.
//!
//! One directory per stream, named by the canonical label encoding. Each
//! chunk is a `chunk_<unixSec>_<seq>.log` data file (`.log.gz` when
//! compression is enabled) of newline-delimited JSON frames, with a
//! sibling `chunk_<unixSec>_<seq>.meta` JSON sidecar. The sidecar is
//! written after the data file is sealed; its existence is the commit
//! marker.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use logwell_model::{time, LabelSet, LogEntry, StreamId};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DATA_EXT: &str = "log";
pub const DATA_GZ_EXT: &str = "log.gz";
pub const META_EXT: &str = "meta";

/// Sidecar metadata for one sealed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub labels: LabelSet,
    #[serde(with = "time::serde_flex")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "time::serde_flex")]
    pub end_time: DateTime<Utc>,
    pub entry_count: u64,
}

/// One stored frame. Labels live once in the sidecar and are re-attached
/// by the reader; the frame timestamp is unix nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFrame {
    pub id: u64,
    pub ts: i64,
    pub line: String,
}

impl ChunkFrame {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            ts: entry.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            line: entry.line.clone(),
        }
    }

    pub fn into_entry(self, labels: &LabelSet) -> LogEntry {
        LogEntry {
            id: self.id,
            timestamp: DateTime::from_timestamp_nanos(self.ts),
            line: self.line,
            labels: labels.clone(),
        }
    }
}

/// Format a chunk id from wall-clock seconds and a monotonic sequence.
pub fn chunk_id(unix_sec: i64, seq: u64) -> String {
    format!("chunk_{unix_sec}_{seq}")
}

/// Sort key parsed back out of a chunk id.
pub fn parse_chunk_id(id: &str) -> Option<(i64, u64)> {
    let rest = id.strip_prefix("chunk_")?;
    let (sec, seq) = rest.split_once('_')?;
    Some((sec.parse().ok()?, seq.parse().ok()?))
}

/// Directory holding a stream's chunks.
pub fn stream_dir(root: &Path, stream: &StreamId) -> PathBuf {
    root.join(stream.as_str())
}

pub fn data_path(dir: &Path, chunk_id: &str, compressed: bool) -> PathBuf {
    let ext = if compressed { DATA_GZ_EXT } else { DATA_EXT };
    dir.join(format!("{chunk_id}.{ext}"))
}

pub fn meta_path(dir: &Path, chunk_id: &str) -> PathBuf {
    dir.join(format!("{chunk_id}.{META_EXT}"))
}

/// An inclusive query time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CoreError::TimeRange(format!(
                "start {} is after end {}",
                time::format_rfc3339_nanos(&start),
                time::format_rfc3339_nanos(&end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whether a chunk's `[start_time, end_time]` span overlaps this window.
    pub fn overlaps(&self, meta: &ChunkMeta) -> bool {
        meta.start_time <= self.end && meta.end_time >= self.start
    }
}
