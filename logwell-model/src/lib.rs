//! Core data model definitions shared across Logwell crates.
//!
//! Everything here is plain data: label sets and their canonical stream
//! identity, log entries, the selector grammar, the flexible timestamp
//! codec, and query result shapes. No I/O lives in this crate.

pub mod entry;
pub mod error;
pub mod labels;
pub mod query;
pub mod selector;
pub mod time;

// Intentionally curated re-exports for downstream consumers.
pub use entry::{LogEntry, PushEntry, PushRequest, PushStream};
pub use error::{LabelError, SelectorError, TimeParseError};
pub use labels::{LabelSet, StreamId};
pub use query::{QueryResult, QueryStats};
pub use selector::{MatchOp, Matcher, Selector};
pub use time::{format_rfc3339_nanos, parse_flexible};
