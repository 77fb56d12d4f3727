//! Collision-free destination names: `report.txt` -> `report(1).txt` -> `report(2).txt`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{HomeCloudError, Result};

/// Upper bound on `(n)` suffixes tried before giving up.
pub const MAX_COLLISION_PROBES: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn of(metadata: &std::fs::Metadata) -> Self {
        if metadata.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }
}

/// Return `desired` if nothing occupies it, otherwise the first free `base(n)ext` sibling.
///
/// Only advisory: nothing is locked between this probe and the caller's write.
pub async fn next_available_name(desired: &Path, kind: EntryKind) -> Result<PathBuf> {
    if !occupied(desired).await? {
        return Ok(desired.to_path_buf());
    }

    let file_name = desired
        .file_name()
        .ok_or_else(|| HomeCloudError::invalid_request(format!("No file name in {}", desired.display())))?
        .to_string_lossy()
        .into_owned();
    let (base, ext) = split_name(&file_name, kind);
    let parent = desired.parent().unwrap_or_else(|| Path::new(""));

    for counter in 1..=MAX_COLLISION_PROBES {
        let candidate = parent.join(OsString::from(format!("{base}({counter}){ext}")));
        if !occupied(&candidate).await? {
            return Ok(candidate);
        }
    }

    Err(HomeCloudError::CollisionProbeExhausted {
        path: desired.to_path_buf(),
        attempts: MAX_COLLISION_PROBES,
    })
}

/// Split into base and extension. The extension starts at the last `.`, except a
/// leading dot (`.env`) which belongs to the base. Directories never split.
pub fn split_name(name: &str, kind: EntryKind) -> (&str, &str) {
    if kind == EntryKind::Directory {
        return (name, "");
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

async fn occupied(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
