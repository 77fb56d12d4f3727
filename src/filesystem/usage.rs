use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{HomeCloudError, Result};

/// Aggregate byte size of all regular files under the storage root.
///
/// Kept up to date by `add` for new files and by full rescans for removals and
/// renames. Readers never wait on a walk, only on the short install step.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    bytes: RwLock<u64>,
    walking: AtomicBool,
    rescan: Notify,
}

impl UsageAccumulator {
    pub fn new(initial: u64) -> Self {
        Self {
            bytes: RwLock::new(initial),
            walking: AtomicBool::new(false),
            rescan: Notify::new(),
        }
    }

    pub fn read(&self) -> u64 {
        *self.bytes.read()
    }

    pub fn add(&self, delta: u64) {
        {
            let mut bytes = self.bytes.write();
            *bytes = bytes.saturating_add(delta);
        }
        // A walk in flight may install a total that predates this file.
        if self.walking.load(Ordering::Acquire) {
            self.rescan.notify_one();
        }
    }

    /// Walk `root` and replace the cached total. On failure the previous total is kept.
    pub async fn recompute(&self, root: &Path) -> Result<u64> {
        self.walking.store(true, Ordering::Release);

        let owned: PathBuf = root.to_path_buf();
        let walked = tokio::task::spawn_blocking(move || tree_size(&owned))
            .await
            .map_err(|e| HomeCloudError::recompute(format!("walk task failed: {e}")))
            .and_then(|r| r);

        let result = match walked {
            Ok(total) => {
                *self.bytes.write() = total;
                debug!("Storage usage recomputed: {} bytes", total);
                Ok(total)
            }
            Err(e) => {
                warn!("Keeping previous usage of {} bytes: {}", self.read(), e);
                Err(e)
            }
        };

        self.walking.store(false, Ordering::Release);
        result
    }

    /// Ask the recompute worker for a fresh walk. Requests made while a walk is
    /// running collapse into a single follow-up walk.
    pub fn request_recompute(&self) {
        self.rescan.notify_one();
    }

    /// Serve `request_recompute` calls until the process exits.
    pub async fn run_recompute_worker(self: Arc<Self>, root: PathBuf) {
        loop {
            self.rescan.notified().await;
            // Errors are logged inside recompute and the old total stays in place.
            let _ = self.recompute(&root).await;
        }
    }
}

/// Sum the sizes of regular files below `root`. Symlinks are not followed.
/// Fails on the first entry that cannot be read.
pub fn tree_size(root: &Path) -> Result<u64> {
    let (total, errors) = walk_sizes(root);
    match errors.into_iter().next() {
        Some(e) => Err(HomeCloudError::recompute(e)),
        None => Ok(total),
    }
}

/// Best-effort variant of `tree_size`: unreadable entries are skipped and reported.
pub fn partial_tree_size(root: &Path) -> (u64, Vec<String>) {
    walk_sizes(root)
}

fn walk_sizes(root: &Path) -> (u64, Vec<String>) {
    let mut total = 0u64;
    let mut errors = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };
        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(metadata) => total = total.saturating_add(metadata.len()),
                Err(e) => errors.push(e.to_string()),
            }
        }
    }
    (total, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_add_increases_by_exact_delta() {
        let usage = UsageAccumulator::new(1000);
        let before = usage.read();
        usage.add(500);
        assert_eq!(usage.read(), before + 500);
    }

    #[test]
    fn test_add_saturates() {
        let usage = UsageAccumulator::new(u64::MAX - 1);
        usage.add(10);
        assert_eq!(usage.read(), u64::MAX);
    }

    #[tokio::test]
    async fn test_recompute_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("one.bin"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("a/two.bin"), vec![0u8; 250]).unwrap();
        std::fs::write(dir.path().join("a/b/empty.bin"), b"").unwrap();

        let usage = UsageAccumulator::new(7);
        assert_eq!(usage.recompute(dir.path()).await.unwrap(), 350);
        assert_eq!(usage.read(), 350);
    }

    #[tokio::test]
    async fn test_failed_recompute_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let usage = UsageAccumulator::new(4242);

        let result = usage.recompute(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(HomeCloudError::Recompute(_))));
        assert_eq!(usage.read(), 4242);
    }

    #[tokio::test]
    async fn test_worker_serves_requests() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), vec![1u8; 64]).unwrap();

        let usage = Arc::new(UsageAccumulator::new(0));
        let worker = tokio::spawn(usage.clone().run_recompute_worker(dir.path().to_path_buf()));

        usage.request_recompute();
        for _ in 0..100 {
            if usage.read() == 64 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(usage.read(), 64);
        worker.abort();
    }

    #[test]
    fn test_partial_size_reports_missing_root() {
        let dir = TempDir::new().unwrap();
        let (total, errors) = partial_tree_size(&dir.path().join("missing"));
        assert_eq!(total, 0);
        assert_eq!(errors.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_partial_size_skips_unreadable_directories() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("lost+found");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("hidden.bin"), vec![0u8; 50]).unwrap();
        std::fs::write(dir.path().join("visible.bin"), vec![0u8; 100]).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user.
        let enforced = std::fs::read_dir(&locked).is_err();
        let strict = tree_size(dir.path());
        let (total, errors) = partial_tree_size(dir.path());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if enforced {
            assert!(matches!(strict, Err(HomeCloudError::Recompute(_))));
            assert_eq!(total, 100);
            assert_eq!(errors.len(), 1);
        } else {
            assert_eq!(strict.unwrap(), 150);
            assert_eq!(total, 150);
        }
    }
}
