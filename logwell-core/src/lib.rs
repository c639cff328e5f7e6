//! Logwell core: the label-indexed log store behind the HTTP surface.
//!
//! The write path runs accept, buffer, batch, persist, index, broadcast;
//! the read path resolves selectors against the in-memory label index
//! and materializes entries from sealed on-disk chunks. Live consumers
//! hang off a bounded fan-out hub. The [`lifecycle::Supervisor`] owns
//! startup ordering and the drain-then-cancel shutdown protocol.

pub mod counters;
pub mod error;
pub mod hub;
pub mod index;
pub mod ingest;
pub mod lifecycle;
pub mod query;
pub mod retention;
pub mod storage;

pub use counters::{CounterSnapshot, Counters};
pub use error::{CoreError, Result};
pub use hub::{HubOptions, StreamHub, StreamMessage, Subscription};
pub use index::LabelIndex;
pub use ingest::Ingestor;
pub use lifecycle::Supervisor;
pub use query::{QueryExecutor, HARD_QUERY_LIMIT};
pub use retention::{RetentionSweeper, SweepStats};
pub use storage::{ChunkMeta, ChunkReader, ChunkWriter, TimeRange};
