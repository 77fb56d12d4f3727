use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::naming::EntryKind;
use super::StorageTracker;
use crate::error::{HomeCloudError, Result};

/// One row of a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub path: String,
    pub full_path: String,
    pub is_dir: bool,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Listing {
    Directory(Vec<ListEntry>),
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub path: String,
    pub size: u64,
}

/// A regular file inside the root, ready to be streamed.
#[derive(Debug, Clone)]
pub struct OpenedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Client-facing file operations. Every path goes through the tracker's sandbox
/// before the filesystem is touched.
#[derive(Debug, Clone)]
pub struct FileStore {
    tracker: Arc<StorageTracker>,
}

impl FileStore {
    pub fn new(tracker: Arc<StorageTracker>) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &Arc<StorageTracker> {
        &self.tracker
    }

    /// Stream `body` into `dir/file_name`, picking a free name if it is taken.
    ///
    /// `size_hint` is checked against the hard ceiling up front; the running byte
    /// count is checked again per chunk because the hint may be missing or wrong.
    pub async fn upload<S, E>(&self, dir: &str, file_name: &str, size_hint: u64, mut body: S) -> Result<UploadOutcome>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        if !self.tracker.admit_upload(size_hint) {
            warn!("Upload rejected: hard storage limit reached");
            return Err(HomeCloudError::quota_exceeded(format!(
                "Storage limited to {} bytes in total",
                self.tracker.quota().hard_limit_bytes()
            )));
        }

        let file_name = validate_file_name(file_name)?;
        let target_dir = self.tracker.resolve_path(dir)?;
        fs::create_dir_all(&target_dir).await?;

        let target = self
            .tracker
            .next_available_name(&target_dir.join(file_name), EntryKind::File)
            .await?;

        info!("Uploading file: {}, expected size: {}", target.display(), size_hint);
        let written = match write_stream(&self.tracker, &target, &mut body).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&target).await {
                    warn!("Failed to remove partial upload {}: {}", target.display(), cleanup);
                }
                return Err(e);
            }
        };

        // The watcher saw this file when it was still empty.
        self.tracker.request_recompute();

        Ok(UploadOutcome {
            path: self.tracker.sandbox().relative_to_root(&target)?,
            size: written,
        })
    }

    pub async fn mkdir(&self, path: &str) -> Result<String> {
        if path.trim().is_empty() {
            return Err(HomeCloudError::invalid_request("Folder path is required"));
        }
        let desired = self.tracker.resolve_path(path)?;
        if self.tracker.sandbox().is_root(&desired) {
            return Err(HomeCloudError::invalid_request("Cannot create the storage root"));
        }

        let target = self
            .tracker
            .next_available_name(&desired, EntryKind::Directory)
            .await?;
        fs::create_dir_all(&target).await?;
        info!("Folder created: {}", target.display());

        self.tracker.sandbox().relative_to_root(&target)
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<String> {
        self.relocate(old, new).await
    }

    pub async fn move_entry(&self, source: &str, dest: &str) -> Result<String> {
        self.relocate(source, dest).await
    }

    /// Shared body of rename and move: both land on a collision-free destination.
    async fn relocate(&self, source: &str, dest: &str) -> Result<String> {
        let src = self.tracker.resolve_path(source)?;
        let dst = self.tracker.resolve_path(dest)?;
        let sandbox = self.tracker.sandbox();

        if sandbox.is_root(&src) || sandbox.is_root(&dst) {
            return Err(HomeCloudError::invalid_request("Cannot move the storage root"));
        }

        let metadata = match fs::symlink_metadata(&src).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HomeCloudError::not_found(format!("Source not found: {source}")));
            }
            Err(e) => return Err(e.into()),
        };

        if dst == src {
            return sandbox.relative_to_root(&src);
        }

        let kind = EntryKind::of(&metadata);
        if kind == EntryKind::Directory && dst.starts_with(&src) && dst != src {
            return Err(HomeCloudError::invalid_request("Cannot move a folder into itself"));
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }

        let target = self.tracker.next_available_name(&dst, kind).await?;
        fs::rename(&src, &target).await?;
        info!("Moved {} to {}", src.display(), target.display());

        sandbox.relative_to_root(&target)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(HomeCloudError::invalid_request("path parameter required"));
        }
        let target = self.tracker.resolve_path(path)?;
        if self.tracker.sandbox().is_root(&target) {
            return Err(HomeCloudError::invalid_request("Cannot delete the storage root"));
        }

        let metadata = match fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HomeCloudError::not_found(format!("File or folder not found: {path}")));
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&target).await?;
        } else {
            fs::remove_file(&target).await?;
        }

        info!("Deleted successfully: {}", target.display());
        Ok(())
    }

    pub async fn list(&self, path: &str) -> Result<Listing> {
        let dir = self.tracker.resolve_path(path)?;
        let metadata = fs::metadata(&dir)
            .await
            .map_err(|_| HomeCloudError::not_found(format!("Not found: {path}")))?;

        if !metadata.is_dir() {
            return Ok(Listing::File(dir));
        }

        let sandbox = self.tracker.sandbox();
        let mut entries = Vec::new();
        let mut dir_stream = fs::read_dir(&dir).await?;

        while let Some(entry) = dir_stream.next_entry().await? {
            let metadata = entry.metadata().await?;
            let entry_path = entry.path();

            entries.push(ListEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: sandbox.relative_to_root(&entry_path)?,
                full_path: entry_path.to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                mod_time: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH)),
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(Listing::Directory(entries))
    }

    pub async fn open(&self, path: &str) -> Result<OpenedFile> {
        let full_path = self.tracker.resolve_path(path)?;
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|_| HomeCloudError::not_found(format!("File not found: {path}")))?;

        if metadata.is_dir() {
            return Err(HomeCloudError::invalid_request("Cannot stream a directory"));
        }

        let name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(OpenedFile {
            path: full_path,
            name,
            size: metadata.len(),
        })
    }
}

fn validate_file_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(HomeCloudError::invalid_request("Invalid file name"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains('\0') {
        return Err(HomeCloudError::path_escape(name));
    }
    Ok(trimmed)
}

async fn write_stream<S, E>(tracker: &StorageTracker, target: &Path, body: &mut S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    // Taken before the file exists, so bytes the watcher picks up from it later are not
    // counted twice against the ceiling.
    let baseline = tracker.current_usage_bytes();
    let mut file = fs::File::create(target).await?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| HomeCloudError::invalid_request(format!("Upload interrupted: {e}")))?;
        written += chunk.len() as u64;
        if !tracker.quota().fits(baseline, written) {
            return Err(HomeCloudError::quota_exceeded("Upload would exceed the storage limit"));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
