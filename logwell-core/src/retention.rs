//! Retention sweeper.
//!
//! Runs on a wall-clock ticker, deletes regular files older than the
//! retention horizon, then prunes directories left empty. Deletions are
//! independent; an interrupted sweep simply resumes on the next tick.
//! The sweeper shares no locks with writers because sealed chunks are
//! never reopened, and readers tolerate files vanishing mid-query.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::counters::Counters;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    root: PathBuf,
    horizon: Duration,
    interval: Duration,
    counters: Arc<Counters>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub files_deleted: u64,
    pub dirs_pruned: u64,
}

impl RetentionSweeper {
    pub fn new(root: impl Into<PathBuf>, horizon: Duration, counters: Arc<Counters>) -> Self {
        Self {
            root: root.into(),
            horizon,
            interval: DEFAULT_SWEEP_INTERVAL,
            counters,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the ticker loop; exits when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick; startup is not a sweep.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        match tokio::task::spawn_blocking(move || sweeper.sweep()).await {
                            Ok(stats) if stats.files_deleted > 0 || stats.dirs_pruned > 0 => {
                                info!(
                                    files = stats.files_deleted,
                                    dirs = stats.dirs_pruned,
                                    "retention sweep finished"
                                );
                            }
                            Ok(_) => debug!("retention sweep found nothing to do"),
                            Err(err) => warn!(error = %err, "retention sweep task failed"),
                        }
                    }
                }
            }
            info!("retention sweeper stopping");
        })
    }

    /// One synchronous sweep pass over the storage root.
    pub fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        if !self.root.exists() {
            return stats;
        }
        let cutoff = SystemTime::now() - self.horizon;

        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                Some(modified) => modified,
                None => {
                    warn!(path = %entry.path().display(), "skipping file without readable mtime");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    stats.files_deleted += 1;
                    if entry
                        .path()
                        .to_str()
                        .is_some_and(|p| p.ends_with(".log") || p.ends_with(".log.gz"))
                    {
                        self.counters.chunks_deleted.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "failed to delete expired file");
                }
            }
        }

        // Bottom-up pass removes directories the deletions emptied.
        for entry in WalkDir::new(&self.root)
            .contents_first(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() || entry.path() == self.root {
                continue;
            }
            let is_empty = fs::read_dir(entry.path())
                .map(|mut dir| dir.next().is_none())
                .unwrap_or(false);
            if is_empty && fs::remove_dir(entry.path()).is_ok() {
                stats.dirs_pruned += 1;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sweeper(root: &Path, horizon: Duration) -> (RetentionSweeper, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            RetentionSweeper::new(root, horizon, counters.clone()),
            counters,
        )
    }

    #[test]
    fn zero_horizon_deletes_everything_and_prunes_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let stream = dir.path().join("service=api");
        fs::create_dir_all(&stream).unwrap();
        fs::write(stream.join("chunk_1_0.log"), "data").unwrap();
        fs::write(stream.join("chunk_1_0.meta"), "{}").unwrap();

        // Ensure mtimes are strictly in the past.
        std::thread::sleep(Duration::from_millis(20));

        let (sweeper, counters) = sweeper(dir.path(), Duration::ZERO);
        let stats = sweeper.sweep();
        assert_eq!(stats.files_deleted, 2);
        assert_eq!(stats.dirs_pruned, 1);
        assert!(!stream.exists());
        assert!(dir.path().exists());
        assert_eq!(counters.snapshot().chunks_deleted, 1);
    }

    #[test]
    fn long_horizon_preserves_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let stream = dir.path().join("service=api");
        fs::create_dir_all(&stream).unwrap();
        fs::write(stream.join("chunk_1_0.log"), "data").unwrap();

        let (sweeper, _) = sweeper(dir.path(), Duration::from_secs(24 * 60 * 60));
        let stats = sweeper.sweep();
        assert_eq!(stats, SweepStats::default());
        assert!(stream.join("chunk_1_0.log").exists());
    }

    #[test]
    fn already_empty_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("service=gone")).unwrap();

        let (sweeper, _) = sweeper(dir.path(), Duration::from_secs(60));
        let stats = sweeper.sweep();
        assert_eq!(stats.dirs_pruned, 1);
    }

    #[test]
    fn missing_root_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (sweeper, _) = sweeper(&dir.path().join("nope"), Duration::ZERO);
        assert_eq!(sweeper.sweep(), SweepStats::default());
    }

    #[tokio::test]
    async fn ticker_sweeps_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stale.log"), "data").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let (sweeper, counters) = sweeper(dir.path(), Duration::ZERO);
        let cancel = CancellationToken::new();
        let task = sweeper
            .with_interval(Duration::from_millis(20))
            .spawn(cancel.clone());

        tokio::time::timeout(Duration::from_secs(2), async {
            while counters.snapshot().chunks_deleted == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sweep never ran");

        cancel.cancel();
        task.await.unwrap();
    }
}
