//! # Logwell Server
//!
//! Lightweight label-indexed log aggregation service: buffered batched
//! ingest, chunked on-disk storage, selector queries over a time range,
//! and real-time fan-out to WebSocket subscribers.
//!
//! The HTTP surface is a thin axum layer over [`logwell_core`]; all
//! pipeline behavior lives there.

/// Route construction
pub mod routes;

/// Request handlers
pub mod handlers;

/// API key middleware
pub mod auth;

/// Error types and handling
pub mod errors;

/// Shared application state
pub mod state;

pub use routes::create_app;
pub use state::AppState;
