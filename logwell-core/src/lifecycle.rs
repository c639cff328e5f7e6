//! Lifecycle supervisor: startup ordering, index restoration, and the
//! graceful shutdown protocol.
//!
//! Startup: label index (restored from the stream directories on disk),
//! chunk writer/reader (with orphan recovery), query executor, stream
//! hub dispatcher, ingest workers, retention sweeper. The HTTP surface
//! starts last, outside this crate.
//!
//! Shutdown: stop accepting ingest and drain within the configured
//! budget, then cancel the root token so the hub and sweeper exit, then
//! wait for them. Subscribers are closed by the hub dispatcher on its
//! way out.

use std::sync::Arc;
use std::time::Duration;

use logwell_config::Config;
use logwell_model::LabelSet;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::counters::Counters;
use crate::error::Result;
use crate::hub::{HubOptions, StreamHub};
use crate::index::LabelIndex;
use crate::ingest::Ingestor;
use crate::query::QueryExecutor;
use crate::retention::RetentionSweeper;
use crate::storage::{self, ChunkReader, ChunkWriter};

#[derive(Debug)]
pub struct Supervisor {
    index: Arc<LabelIndex>,
    executor: Arc<QueryExecutor>,
    hub: Arc<StreamHub>,
    ingestor: Arc<Ingestor>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    ingestor_timeout: Duration,
    background: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    /// Bring up the core in dependency order. Must run inside a tokio
    /// runtime; returns once all background stages are spawned.
    pub fn start(config: &Config) -> Result<Self> {
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();
        let root = &config.storage.path;

        let removed = storage::recover_orphans(root)?;
        if removed > 0 {
            info!(removed, "removed orphaned chunk files");
        }

        let index = Arc::new(LabelIndex::new());
        let restored = restore_index(root, &index)?;
        if restored > 0 {
            info!(streams = restored, "label index restored from disk");
        }

        let writer = Arc::new(ChunkWriter::new(
            root,
            config.storage.compression_enabled,
            counters.clone(),
        )?);
        let reader = ChunkReader::new(root);

        let executor = Arc::new(QueryExecutor::new(
            index.clone(),
            reader,
            counters.clone(),
            cancel.child_token(),
        ));

        let (hub, hub_task) = StreamHub::spawn(
            HubOptions::default(),
            counters.clone(),
            cancel.child_token(),
        );

        let ingestor = Ingestor::spawn(
            &config.ingest,
            &config.storage,
            writer,
            index.clone(),
            hub.clone(),
            counters.clone(),
        );

        let sweeper_task = RetentionSweeper::new(
            root,
            config.storage.retention_horizon(),
            counters.clone(),
        )
        .spawn(cancel.child_token());

        info!(
            storage = %root.display(),
            retention_days = config.storage.retention_days,
            workers = config.ingest.workers,
            "core pipeline started"
        );

        Ok(Self {
            index,
            executor,
            hub,
            ingestor,
            counters,
            cancel,
            ingestor_timeout: config.shutdown.ingestor_timeout(),
            background: tokio::sync::Mutex::new(vec![hub_task, sweeper_task]),
        })
    }

    pub fn index(&self) -> &Arc<LabelIndex> {
        &self.index
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn hub(&self) -> &Arc<StreamHub> {
        &self.hub
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Ordered graceful shutdown. Safe to call once the HTTP surface has
    /// stopped accepting requests.
    pub async fn shutdown(&self) {
        info!("core shutdown starting");

        if tokio::time::timeout(self.ingestor_timeout, self.ingestor.drain())
            .await
            .is_err()
        {
            warn!(
                budget_secs = self.ingestor_timeout.as_secs(),
                "ingest drain exceeded its budget"
            );
        }

        self.cancel.cancel();
        for handle in self.background.lock().await.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "background stage ended abnormally");
            }
        }
        info!("core shutdown complete");
    }
}

/// Rebuild the label index from the stream directory names, which are
/// the canonical label encodings.
fn restore_index(root: &std::path::Path, index: &LabelIndex) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let mut restored = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        match LabelSet::from_canonical(&name) {
            Ok(labels) if !labels.is_empty() => {
                index.register(&labels);
                restored += 1;
            }
            _ => warn!(dir = %name, "skipping non-stream directory in storage root"),
        }
    }
    Ok(restored)
}
