use std::sync::Arc;

use chrono::{DateTime, Utc};
use logwell_config::Config;
use logwell_core::Supervisor;

/// Server application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>, config: Arc<Config>) -> Self {
        Self {
            supervisor,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("started_at", &self.started_at)
            .finish()
    }
}
