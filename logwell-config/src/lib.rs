//! Shared configuration library for Logwell.
//!
//! This crate centralizes config loading and validation so the server
//! binary and tests share a single source of truth for defaults and
//! override precedence: YAML file, then `LOGWELL_`-prefixed environment
//! variables, then CLI flags applied by the caller.

pub mod loader;
pub mod models;

pub use loader::{ConfigError, ConfigLoader};
pub use models::{
    AuthConfig, Config, IngestConfig, ServerConfig, ShutdownConfig, StorageConfig,
};
