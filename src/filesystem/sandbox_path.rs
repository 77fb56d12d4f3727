//! Confinement of client supplied paths to the storage root.

use std::path::{Component, Path, PathBuf};

use crate::error::{HomeCloudError, Result};

/// Resolves untrusted relative paths against a fixed root directory.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// The root is made absolute once; it is not required to exist yet.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: normalize_absolute(&root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` to an absolute path inside the root.
    ///
    /// The path is normalized lexically, without touching the filesystem. A leading `/`
    /// is treated as the root itself, so `/docs` and `docs` are the same location.
    /// Anything that would climb above the root is rejected with `PathEscape`.
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf> {
        if user_path.contains('\0') {
            return Err(HomeCloudError::path_escape(user_path.replace('\0', "\\0")));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(user_path).components() {
            match component {
                Component::Normal(name) => normalized.push(name),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(HomeCloudError::path_escape(user_path));
                    }
                }
                Component::Prefix(_) => {
                    return Err(HomeCloudError::path_escape(user_path));
                }
            }
        }

        let joined = std::path::absolute(self.root.join(&normalized))?;
        if !joined.starts_with(&self.root) {
            return Err(HomeCloudError::path_escape(user_path));
        }

        Ok(joined)
    }

    /// Render a resolved path relative to the root with `/` separators.
    pub fn relative_to_root(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| HomeCloudError::path_escape(path.display().to_string()))?;

        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }
}

/// `std::path::absolute` keeps `..` on unix, fold them away for the root.
fn normalize_absolute(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
