use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::naming::{self, EntryKind};
use super::usage::partial_tree_size;
use super::watcher::{notify_backend, DirectoryWatcher};
use super::{EventDebouncer, PathSandbox, QuotaGate, QuotaStatus, UsageAccumulator};
use crate::config::{StorageConfig, WatcherConfig};
use crate::error::{HomeCloudError, Result};

/// Process-wide view of the storage root: path confinement, naming, live usage and
/// the upload gate. Built once at startup and shared behind an `Arc`.
#[derive(Debug)]
pub struct StorageTracker {
    sandbox: PathSandbox,
    usage: Arc<UsageAccumulator>,
    debouncer: Arc<EventDebouncer>,
    quota: QuotaGate,
}

/// Background tasks owned by a running tracker.
#[derive(Debug)]
pub struct TrackerTasks {
    pub watcher: JoinHandle<()>,
    pub recompute: JoinHandle<()>,
}

impl TrackerTasks {
    pub fn abort(&self) {
        self.watcher.abort();
        self.recompute.abort();
    }
}

impl StorageTracker {
    /// Tracker without change notifications. Usage is seeded once and only moves
    /// through explicit `add`/recompute calls.
    pub async fn detached(storage: &StorageConfig, watcher: &WatcherConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&storage.root).await?;
        let sandbox = PathSandbox::new(&storage.root)?;

        let root = sandbox.root().to_path_buf();
        let (initial, errors) = tokio::task::spawn_blocking(move || partial_tree_size(&root))
            .await
            .map_err(|e| HomeCloudError::internal(e.to_string()))?;

        let usage = Arc::new(UsageAccumulator::new(initial));
        if let Some(first) = errors.first() {
            let err = HomeCloudError::recompute(first.clone());
            warn!(
                "Startup walk skipped {} unreadable entries, starting from {} bytes: {}",
                errors.len(),
                initial,
                err
            );
            // Picked up by the recompute worker once it runs.
            usage.request_recompute();
        }
        let quota = QuotaGate::new(usage.clone(), storage.hard_limit_bytes, storage.quota_gb);

        Ok(Self {
            sandbox,
            usage,
            debouncer: Arc::new(EventDebouncer::new(Duration::from_millis(watcher.debounce_ms))),
            quota,
        })
    }

    /// Seed usage from a full walk, subscribe every directory and spawn the watcher
    /// and recompute tasks. Fails if the root cannot be watched.
    pub async fn start(storage: &StorageConfig, watcher: &WatcherConfig) -> Result<(Arc<Self>, TrackerTasks)> {
        let tracker = Arc::new(Self::detached(storage, watcher).await?);
        info!(
            "Storage root {} holds {} bytes",
            tracker.root().display(),
            tracker.current_usage_bytes()
        );

        let (backend, receiver) = notify_backend()?;
        let mut directory_watcher = DirectoryWatcher::new(
            backend,
            receiver,
            tracker.usage.clone(),
            tracker.debouncer.clone(),
            Duration::from_secs(watcher.sweep_interval_secs.max(1)),
        );
        directory_watcher.watch_root(tracker.root()).await?;

        let tasks = TrackerTasks {
            watcher: tokio::spawn(directory_watcher.run()),
            recompute: tokio::spawn(
                tracker
                    .usage
                    .clone()
                    .run_recompute_worker(tracker.root().to_path_buf()),
            ),
        };

        Ok((tracker, tasks))
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn resolve_path(&self, user_path: &str) -> Result<PathBuf> {
        self.sandbox.resolve(user_path)
    }

    pub async fn next_available_name(&self, desired: &Path, kind: EntryKind) -> Result<PathBuf> {
        naming::next_available_name(desired, kind).await
    }

    pub fn usage(&self) -> &Arc<UsageAccumulator> {
        &self.usage
    }

    pub fn current_usage_bytes(&self) -> u64 {
        self.usage.read()
    }

    pub fn admit_upload(&self, incoming_bytes: u64) -> bool {
        self.quota.admit(incoming_bytes)
    }

    pub fn request_recompute(&self) {
        self.usage.request_recompute();
    }

    /// Recompute inline rather than through the worker.
    pub async fn recompute_now(&self) -> Result<u64> {
        self.usage.recompute(self.sandbox.root()).await
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.status()
    }

    pub fn debounce_ledger_len(&self) -> usize {
        self.debouncer.len()
    }
}
