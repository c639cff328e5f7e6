//! Chunked on-disk storage: sealed append-only chunk files with JSON
//! sidecars, one directory per label stream.

pub mod chunk;
pub mod reader;
pub mod writer;

pub use chunk::{ChunkMeta, TimeRange};
pub use reader::{ChunkReader, StreamEntries};
pub use writer::{recover_orphans, ChunkWriter};
