//! Chunk writer: seals one chunk per `(stream, batch)`.
//!
//! The data file is fully written, flushed and synced before the sidecar
//! is created. A failure at any point removes the partial data file, so a
//! reader can never observe a chunk without its sidecar.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use flate2::write::GzEncoder;
use flate2::Compression;
use logwell_model::{LabelSet, LogEntry, StreamId};
use tracing::{debug, warn};

use crate::counters::Counters;
use crate::error::{CoreError, Result};
use crate::storage::chunk::{self, ChunkFrame, ChunkMeta};

#[derive(Debug)]
pub struct ChunkWriter {
    root: PathBuf,
    compression: bool,
    seq: AtomicU64,
    // Serializes chunk creation within a stream directory; cross-stream
    // writes stay parallel.
    dir_locks: DashMap<StreamId, Arc<tokio::sync::Mutex<()>>>,
    counters: Arc<Counters>,
}

impl ChunkWriter {
    pub fn new(root: impl Into<PathBuf>, compression: bool, counters: Arc<Counters>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            compression,
            seq: AtomicU64::new(0),
            dir_locks: DashMap::new(),
            counters,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Seal one chunk holding `entries` for the given stream.
    pub async fn write_chunk(&self, labels: &LabelSet, entries: &[LogEntry]) -> Result<ChunkMeta> {
        if entries.is_empty() {
            return Err(CoreError::Validation("empty batch".into()));
        }

        let stream = labels.stream_id();
        let lock = self
            .dir_locks
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let dir = chunk::stream_dir(&self.root, &stream);
        let start_time = entries.iter().map(|e| e.timestamp).min().expect("non-empty");
        let end_time = entries.iter().map(|e| e.timestamp).max().expect("non-empty");
        let frames: Vec<ChunkFrame> = entries.iter().map(ChunkFrame::from_entry).collect();

        let unix_sec = Utc::now().timestamp();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let labels = labels.clone();
        let compression = self.compression;
        let entry_count = frames.len() as u64;

        let meta = tokio::task::spawn_blocking(move || {
            write_chunk_sync(
                &dir, unix_sec, seq, compression, &frames,
                ChunkMeta {
                    chunk_id: String::new(),
                    labels,
                    start_time,
                    end_time,
                    entry_count,
                },
            )
        })
        .await
        .map_err(|err| CoreError::Internal(format!("chunk write task failed: {err}")))??;

        self.counters.chunks_written.fetch_add(1, Ordering::Relaxed);
        debug!(
            stream = %stream,
            chunk = %meta.chunk_id,
            entries = meta.entry_count,
            "sealed chunk"
        );
        Ok(meta)
    }
}

fn write_chunk_sync(
    dir: &Path,
    unix_sec: i64,
    mut seq: u64,
    compression: bool,
    frames: &[ChunkFrame],
    mut meta: ChunkMeta,
) -> Result<ChunkMeta> {
    fs::create_dir_all(dir)?;

    // The sequence is process-monotonic; bumping past an existing name
    // covers chunks left by a previous run in the same wall-clock second.
    let (file, data_path, chunk_id) = loop {
        let chunk_id = chunk::chunk_id(unix_sec, seq);
        let data_path = chunk::data_path(dir, &chunk_id, compression);
        match OpenOptions::new().write(true).create_new(true).open(&data_path) {
            Ok(file) => break (file, data_path, chunk_id),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                seq += 1;
            }
            Err(err) => return Err(err.into()),
        }
    };

    match write_frames(file, compression, frames) {
        Ok(()) => {}
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(&data_path) {
                warn!(path = %data_path.display(), error = %cleanup, "failed to remove partial chunk");
            }
            return Err(err);
        }
    }

    meta.chunk_id = chunk_id.clone();
    let meta_path = chunk::meta_path(dir, &chunk_id);
    let encoded = serde_json::to_vec(&meta)?;
    if let Err(err) = fs::write(&meta_path, encoded) {
        if let Err(cleanup) = fs::remove_file(&data_path) {
            warn!(path = %data_path.display(), error = %cleanup, "failed to remove partial chunk");
        }
        return Err(err.into());
    }

    Ok(meta)
}

fn write_frames(file: File, compression: bool, frames: &[ChunkFrame]) -> Result<()> {
    if compression {
        let mut encoder = GzEncoder::new(BufWriter::new(&file), Compression::default());
        for frame in frames {
            serde_json::to_writer(&mut encoder, frame)?;
            encoder.write_all(b"\n")?;
        }
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(&file);
        for frame in frames {
            serde_json::to_writer(&mut writer, frame)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    file.sync_all()?;
    Ok(())
}

/// Startup recovery: delete data files whose sidecar never landed.
///
/// A data file without its `.meta` was interrupted mid-write and is
/// invisible to readers anyway.
pub fn recover_orphans(root: &Path) -> Result<u64> {
    let mut removed = 0;
    if !root.exists() {
        return Ok(removed);
    }
    for stream_dir in fs::read_dir(root)? {
        let stream_dir = stream_dir?.path();
        if !stream_dir.is_dir() {
            continue;
        }
        for file in fs::read_dir(&stream_dir)? {
            let path = file?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let stem = match name
                .strip_suffix(&format!(".{}", chunk::DATA_GZ_EXT))
                .or_else(|| name.strip_suffix(&format!(".{}", chunk::DATA_EXT)))
            {
                Some(stem) => stem,
                None => continue,
            };
            if !chunk::meta_path(&stream_dir, stem).exists() {
                warn!(path = %path.display(), "removing orphaned chunk data file");
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn labels() -> LabelSet {
        LabelSet::try_from_pairs([("service", "api")]).unwrap()
    }

    fn entry(id: u64, nanos: i64, line: &str) -> LogEntry {
        LogEntry {
            id,
            timestamp: DateTime::from_timestamp_nanos(nanos),
            line: line.to_string(),
            labels: labels(),
        }
    }

    fn writer(root: &Path, compression: bool) -> ChunkWriter {
        ChunkWriter::new(root, compression, Arc::new(Counters::default())).unwrap()
    }

    #[tokio::test]
    async fn writes_data_then_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), false);

        let meta = writer
            .write_chunk(&labels(), &[entry(1, 100, "a"), entry(2, 50, "b")])
            .await
            .unwrap();

        assert_eq!(meta.entry_count, 2);
        assert_eq!(meta.start_time, DateTime::from_timestamp_nanos(50));
        assert_eq!(meta.end_time, DateTime::from_timestamp_nanos(100));

        let stream_dir = chunk::stream_dir(dir.path(), &labels().stream_id());
        assert!(chunk::data_path(&stream_dir, &meta.chunk_id, false).exists());
        assert!(chunk::meta_path(&stream_dir, &meta.chunk_id).exists());
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), false);
        assert!(matches!(
            writer.write_chunk(&labels(), &[]).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn sequence_avoids_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), false);

        let a = writer.write_chunk(&labels(), &[entry(1, 1, "a")]).await.unwrap();
        let b = writer.write_chunk(&labels(), &[entry(2, 2, "b")]).await.unwrap();
        assert_ne!(a.chunk_id, b.chunk_id);
    }

    #[test]
    fn orphan_recovery_removes_uncommitted_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let stream_dir = dir.path().join("service=api");
        fs::create_dir_all(&stream_dir).unwrap();

        // Committed chunk: data + sidecar.
        fs::write(stream_dir.join("chunk_1_0.log"), "{}\n").unwrap();
        fs::write(stream_dir.join("chunk_1_0.meta"), "{}").unwrap();
        // Orphan: data only.
        fs::write(stream_dir.join("chunk_2_1.log"), "{}\n").unwrap();

        let removed = recover_orphans(dir.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(stream_dir.join("chunk_1_0.log").exists());
        assert!(!stream_dir.join("chunk_2_1.log").exists());
    }
}
