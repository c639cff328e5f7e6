//! Configuration model with serde defaults.
//!
//! Every section can be omitted entirely; the defaults below describe a
//! single-node deployment writing to `./data`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration, merged from file, environment and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Chunk storage and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for stream directories and chunk files.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Byte threshold at which a batcher flushes regardless of entry count.
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
    /// Age in days beyond which chunk files are deleted by the sweeper.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Gzip-compress chunk data files.
    #[serde(default)]
    pub compression_enabled: bool,
}

/// Ingest pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Capacity of the bounded accept channel.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum time a batch may sit unflushed.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Entry count at which a batcher flushes.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Maximum concurrent chunk flushes across streams.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Response write timeout in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    /// Keep-alive idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

/// API key authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Graceful shutdown budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Grace period for in-flight HTTP requests.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Grace period for draining and force-flushing the ingest pipeline.
    #[serde(default = "default_ingestor_timeout")]
    pub ingestor_timeout_seconds: u64,
}

impl StorageConfig {
    pub fn retention_horizon(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}

impl IngestConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl ShutdownConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn ingestor_timeout(&self) -> Duration {
        Duration::from_secs(self.ingestor_timeout_seconds)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            chunk_size_bytes: default_chunk_size_bytes(),
            retention_days: default_retention_days(),
            compression_enabled: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_size: default_max_batch_size(),
            workers: default_workers(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: default_http_timeout(),
            ingestor_timeout_seconds: default_ingestor_timeout(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chunk_size_bytes() -> u64 {
    1024 * 1024
}

fn default_retention_days() -> u32 {
    7
}

fn default_buffer_size() -> usize {
    10_000
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_workers() -> usize {
    4
}

fn default_port() -> u16 {
    3100
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    30
}

fn default_ingestor_timeout() -> u64 {
    10
}
