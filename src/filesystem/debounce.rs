use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Entries older than this many windows are dropped by `sweep`.
const SWEEP_AGE_WINDOWS: u32 = 4;

/// Per-path coalescing filter for change notifications.
///
/// The first event of a burst is admitted, everything for the same path inside the
/// window after it is dropped regardless of its kind.
#[derive(Debug)]
pub struct EventDebouncer {
    window: Duration,
    ledger: Mutex<HashMap<PathBuf, Instant>>,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, path: &Path, now: Instant) -> bool {
        let mut ledger = self.ledger.lock();
        if let Some(last) = ledger.get(path) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        ledger.insert(path.to_path_buf(), now);
        true
    }

    /// Forget paths whose last admitted event is long past. Returns how many were evicted.
    pub fn sweep(&self, now: Instant) -> usize {
        let max_age = self.window * SWEEP_AGE_WINDOWS;
        let mut ledger = self.ledger.lock();
        let before = ledger.len();
        ledger.retain(|_, last| now.saturating_duration_since(*last) < max_age);
        before - ledger.len()
    }

    pub fn len(&self) -> usize {
        self.ledger.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.lock().is_empty()
    }
}
