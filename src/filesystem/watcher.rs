use notify::{event::ModifyKind, Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{EventDebouncer, UsageAccumulator};
use crate::error::{HomeCloudError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Written,
    Removed,
    Renamed,
}

#[derive(Debug)]
pub enum WatchMessage {
    Event(FsEvent),
    /// The OS queue overflowed and events were lost.
    Rescan,
    Error(notify::Error),
}

/// Something that can subscribe a single directory (non-recursively) to change notifications.
pub trait WatchBackend: Send + 'static {
    fn subscribe(&mut self, dir: &Path) -> Result<()>;
}

impl WatchBackend for notify::RecommendedWatcher {
    fn subscribe(&mut self, dir: &Path) -> Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| HomeCloudError::watch_subscription(format!("{}: {}", dir.display(), e)))
    }
}

/// Create the OS watcher and the channel its callback feeds.
pub fn notify_backend() -> Result<(notify::RecommendedWatcher, mpsc::UnboundedReceiver<WatchMessage>)> {
    let (sender, receiver) = mpsc::unbounded_channel();

    let watcher = notify::recommended_watcher(move |event_result: notify::Result<Event>| {
        let event = match event_result {
            Ok(event) => event,
            Err(e) => {
                let _ = sender.send(WatchMessage::Error(e));
                return;
            }
        };

        if event.need_rescan() {
            let _ = sender.send(WatchMessage::Rescan);
        }

        let kind = match event.kind {
            EventKind::Create(_) => FsEventKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Renamed,
            EventKind::Modify(_) => FsEventKind::Written,
            EventKind::Remove(_) => FsEventKind::Removed,
            _ => return,
        };

        for path in event.paths {
            let _ = sender.send(WatchMessage::Event(FsEvent { kind, path }));
        }
    })?;

    Ok((watcher, receiver))
}

/// Keeps every directory under the root subscribed and turns change events into
/// usage updates. Runs as a single task; the watch set is owned here.
pub struct DirectoryWatcher<B: WatchBackend> {
    backend: B,
    receiver: mpsc::UnboundedReceiver<WatchMessage>,
    watch_set: HashSet<PathBuf>,
    usage: Arc<UsageAccumulator>,
    debouncer: Arc<EventDebouncer>,
    sweep_interval: Duration,
}

impl<B: WatchBackend> DirectoryWatcher<B> {
    pub fn new(
        backend: B,
        receiver: mpsc::UnboundedReceiver<WatchMessage>,
        usage: Arc<UsageAccumulator>,
        debouncer: Arc<EventDebouncer>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            backend,
            receiver,
            watch_set: HashSet::new(),
            usage,
            debouncer,
            sweep_interval,
        }
    }

    pub fn watch_set(&self) -> &HashSet<PathBuf> {
        &self.watch_set
    }

    /// Subscribe the root and every directory below it. Only a failure on the root
    /// itself is fatal.
    pub async fn watch_root(&mut self, root: &Path) -> Result<()> {
        self.subscribe(root)?;
        let (dirs, _) = collect_tree(root.to_path_buf()).await;
        for dir in dirs {
            if let Err(e) = self.subscribe(&dir) {
                warn!("Skipping watch for {}: {}", dir.display(), e);
            }
        }
        info!("Watching {} directories under {}", self.watch_set.len(), root.display());
        Ok(())
    }

    /// Always goes to the backend: a directory that was removed and created again
    /// under the same name lost its OS subscription even though it is still recorded.
    fn subscribe(&mut self, dir: &Path) -> Result<()> {
        self.backend.subscribe(dir)?;
        self.watch_set.insert(dir.to_path_buf());
        Ok(())
    }

    /// Subscribe a directory that appeared at runtime, plus anything already inside it.
    /// Returns true when it was not empty, meaning some creations were never seen.
    async fn subscribe_new_tree(&mut self, dir: &Path) -> bool {
        if let Err(e) = self.subscribe(dir) {
            warn!("Skipping watch for {}: {}", dir.display(), e);
        }
        let (subdirs, has_content) = collect_tree(dir.to_path_buf()).await;
        for subdir in subdirs {
            if let Err(e) = self.subscribe(&subdir) {
                warn!("Skipping watch for {}: {}", subdir.display(), e);
            }
        }
        has_content
    }

    pub async fn handle_event(&mut self, event: FsEvent, now: Instant) {
        if !self.debouncer.admit(&event.path, now) {
            self.reconcile_dropped(&event).await;
            return;
        }

        match event.kind {
            FsEventKind::Created => {
                info!("New: {}", event.path.display());
                let metadata = match tokio::fs::symlink_metadata(&event.path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        debug!("Created entry vanished before stat {}: {}", event.path.display(), e);
                        return;
                    }
                };

                if metadata.is_dir() {
                    if self.subscribe_new_tree(&event.path).await {
                        self.usage.request_recompute();
                    }
                } else if metadata.is_file() {
                    self.usage.add(metadata.len());
                }
            }
            FsEventKind::Written => {
                debug!("Modified: {}", event.path.display());
            }
            FsEventKind::Removed => {
                info!("Deleted: {}", event.path.display());
                self.usage.request_recompute();
            }
            FsEventKind::Renamed => {
                info!("Renamed: {}", event.path.display());
                // The destination side of a move-in needs its own subscriptions.
                if let Ok(metadata) = tokio::fs::symlink_metadata(&event.path).await {
                    if metadata.is_dir() {
                        self.subscribe_new_tree(&event.path).await;
                    }
                }
                self.usage.request_recompute();
            }
        }
    }

    /// A dropped event is not acted on, but the state it describes may differ from
    /// what the admitted one saw (created then deleted, deleted then recreated).
    /// Directories still get subscribed and the total gets a fresh walk.
    async fn reconcile_dropped(&mut self, event: &FsEvent) {
        if event.kind == FsEventKind::Written {
            return;
        }
        debug!("Debounced {:?}: {}", event.kind, event.path.display());

        if matches!(event.kind, FsEventKind::Created | FsEventKind::Renamed) {
            if let Ok(metadata) = tokio::fs::symlink_metadata(&event.path).await {
                if metadata.is_dir() {
                    self.subscribe_new_tree(&event.path).await;
                }
            }
        }
        self.usage.request_recompute();
    }

    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.tick().await;

        loop {
            tokio::select! {
                message = self.receiver.recv() => match message {
                    Some(WatchMessage::Event(event)) => self.handle_event(event, Instant::now()).await,
                    Some(WatchMessage::Rescan) => {
                        warn!("Change notifications were dropped, rescanning storage");
                        self.usage.request_recompute();
                    }
                    Some(WatchMessage::Error(e)) => warn!("Watcher error: {}", e),
                    None => {
                        info!("Watcher channel closed, stopping");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    let evicted = self.debouncer.sweep(Instant::now());
                    if evicted > 0 {
                        debug!("Evicted {} stale debounce entries", evicted);
                    }
                }
            }
        }
    }
}

/// Directories strictly below `dir`, and whether `dir` has any entries at all.
async fn collect_tree(dir: PathBuf) -> (Vec<PathBuf>, bool) {
    let walked = tokio::task::spawn_blocking(move || {
        let mut dirs = Vec::new();
        let mut has_content = false;
        for entry in WalkDir::new(&dir).min_depth(1).follow_links(false) {
            match entry {
                Ok(entry) => {
                    has_content = true;
                    if entry.file_type().is_dir() {
                        dirs.push(entry.into_path());
                    }
                }
                Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
            }
        }
        (dirs, has_content)
    })
    .await;

    walked.unwrap_or_else(|e| {
        warn!("Directory scan task failed: {}", e);
        (Vec::new(), false)
    })
}
