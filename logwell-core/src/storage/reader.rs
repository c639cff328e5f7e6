//! Chunk reader: lazy enumeration of stored entries.
//!
//! Candidate chunks are selected by sidecar metadata alone; data files
//! are opened one at a time and decoded line by line, so memory stays
//! bounded by a single decoder regardless of how much a stream holds.
//! A data file that disappears mid-read lost a race with the retention
//! sweeper and is treated as end-of-chunk.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use logwell_model::{LabelSet, LogEntry, StreamId};
use tracing::{debug, warn};

use crate::storage::chunk::{self, ChunkFrame, ChunkMeta, TimeRange};

#[derive(Debug, Clone)]
pub struct ChunkReader {
    root: PathBuf,
}

#[derive(Debug)]
struct ChunkHandle {
    data_path: PathBuf,
    meta: ChunkMeta,
}

impl ChunkReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Lazily enumerate a stream's entries within the window, in chunk
    /// order, preserving stored order within each chunk.
    pub fn enumerate(&self, stream: &StreamId, range: TimeRange) -> StreamEntries {
        StreamEntries {
            chunks: self.overlapping_chunks(stream, &range).into_iter(),
            current: None,
            range,
            scanned: 0,
        }
    }

    fn overlapping_chunks(&self, stream: &StreamId, range: &TimeRange) -> Vec<ChunkHandle> {
        let dir = chunk::stream_dir(&self.root, stream);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut chunks = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let Some(stem) = name.strip_suffix(&format!(".{}", chunk::META_EXT)) else {
                continue;
            };
            let meta = match read_sidecar(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable sidecar");
                    continue;
                }
            };
            if !range.overlaps(&meta) {
                continue;
            }
            let Some(data_path) = find_data_file(&dir, stem) else {
                warn!(path = %path.display(), "sidecar without a data file");
                continue;
            };
            chunks.push(ChunkHandle { data_path, meta });
        }

        chunks.sort_by_key(|c| chunk::parse_chunk_id(&c.meta.chunk_id).unwrap_or((i64::MAX, u64::MAX)));
        chunks
    }
}

fn find_data_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    let plain = chunk::data_path(dir, stem, false);
    if plain.exists() {
        return Some(plain);
    }
    let gz = chunk::data_path(dir, stem, true);
    gz.exists().then_some(gz)
}

fn read_sidecar(path: &Path) -> Result<ChunkMeta, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    serde_json::from_slice(&bytes).map_err(|err| err.to_string())
}

struct OpenChunk {
    reader: Box<dyn BufRead + Send>,
    labels: LabelSet,
    path: PathBuf,
}

/// Iterator over one stream's in-window entries.
///
/// Decode failures skip the remainder of the offending chunk; I/O
/// failures (including deletion races) end the chunk. Neither aborts the
/// overall scan.
pub struct StreamEntries {
    chunks: std::vec::IntoIter<ChunkHandle>,
    current: Option<OpenChunk>,
    range: TimeRange,
    scanned: u64,
}

impl std::fmt::Debug for StreamEntries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntries")
            .field("remaining_chunks", &self.chunks.len())
            .field("range", &self.range)
            .field("scanned", &self.scanned)
            .finish()
    }
}

impl StreamEntries {
    /// Frames decoded so far, including out-of-window ones.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    fn open_next(&mut self) -> bool {
        for handle in self.chunks.by_ref() {
            match open_data_file(&handle.data_path) {
                Ok(reader) => {
                    self.current = Some(OpenChunk {
                        reader,
                        labels: handle.meta.labels.clone(),
                        path: handle.data_path,
                    });
                    return true;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Deleted between listing and open; end-of-chunk.
                    debug!(path = %handle.data_path.display(), "chunk vanished before open");
                }
                Err(err) => {
                    warn!(path = %handle.data_path.display(), error = %err, "failed to open chunk");
                }
            }
        }
        false
    }
}

impl Iterator for StreamEntries {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let Some(open) = self.current.as_mut() else {
                if !self.open_next() {
                    return None;
                }
                continue;
            };

            let mut line = String::new();
            match open.reader.read_line(&mut line) {
                Ok(0) => {
                    self.current = None;
                    continue;
                }
                Err(err) => {
                    debug!(path = %open.path.display(), error = %err, "chunk read ended early");
                    self.current = None;
                    continue;
                }
                Ok(_) => {}
            }

            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkFrame>(trimmed) {
                Ok(frame) => {
                    self.scanned += 1;
                    let entry = frame.into_entry(&open.labels);
                    if self.range.contains(entry.timestamp) {
                        return Some(entry);
                    }
                }
                Err(err) => {
                    warn!(path = %open.path.display(), error = %err, "corrupt frame, skipping rest of chunk");
                    self.current = None;
                }
            }
        }
    }
}

fn open_data_file(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
