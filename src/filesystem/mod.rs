pub mod debounce;
pub mod naming;
pub mod quota;
pub mod sandbox_path;
pub mod store;
pub mod tracker;
pub mod usage;
pub mod watcher;

#[cfg(test)]
mod tests;

pub use debounce::EventDebouncer;
pub use naming::{next_available_name, EntryKind, MAX_COLLISION_PROBES};
pub use quota::{QuotaGate, QuotaStatus};
pub use sandbox_path::PathSandbox;
pub use store::{FileStore, ListEntry, Listing, OpenedFile, UploadOutcome};
pub use tracker::{StorageTracker, TrackerTasks};
pub use usage::{partial_tree_size, tree_size, UsageAccumulator};
pub use watcher::{DirectoryWatcher, FsEvent, FsEventKind, WatchBackend, WatchMessage};
