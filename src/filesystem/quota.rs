use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::UsageAccumulator;
use crate::config::{GIB, MAX_QUOTA_GB, MIN_QUOTA_GB};
use crate::error::{HomeCloudError, Result};

/// Storage limits as presented to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub used_bytes: u64,
    pub quota_gb: u64,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub hard_limit_bytes: u64,
}

/// Decides whether an upload may proceed.
///
/// Two limits exist side by side: the hard ceiling, which is enforced, and the
/// user-facing quota, which is only reported.
#[derive(Debug)]
pub struct QuotaGate {
    usage: Arc<UsageAccumulator>,
    hard_limit_bytes: u64,
    quota_gb: AtomicU64,
}

impl QuotaGate {
    pub fn new(usage: Arc<UsageAccumulator>, hard_limit_bytes: u64, quota_gb: u64) -> Self {
        Self {
            usage,
            hard_limit_bytes,
            quota_gb: AtomicU64::new(quota_gb.clamp(MIN_QUOTA_GB, MAX_QUOTA_GB)),
        }
    }

    /// True when `incoming_bytes` fits under the hard ceiling given current usage.
    /// Not atomic with the write that follows.
    pub fn admit(&self, incoming_bytes: u64) -> bool {
        self.fits(self.usage.read(), incoming_bytes)
    }

    /// Like `admit`, against a usage figure taken earlier. Used while a file is being
    /// written, since live usage may already include part of that same file.
    pub fn fits(&self, used_bytes: u64, incoming_bytes: u64) -> bool {
        used_bytes
            .checked_add(incoming_bytes)
            .is_some_and(|total| total <= self.hard_limit_bytes)
    }

    pub fn hard_limit_bytes(&self) -> u64 {
        self.hard_limit_bytes
    }

    pub fn quota_gb(&self) -> u64 {
        self.quota_gb.load(Ordering::Relaxed)
    }

    pub fn set_quota_gb(&self, quota_gb: u64) -> Result<()> {
        if !(MIN_QUOTA_GB..=MAX_QUOTA_GB).contains(&quota_gb) {
            return Err(HomeCloudError::invalid_request(format!(
                "Quota must be between {MIN_QUOTA_GB} and {MAX_QUOTA_GB} GB"
            )));
        }
        self.quota_gb.store(quota_gb, Ordering::Relaxed);
        Ok(())
    }

    pub fn status(&self) -> QuotaStatus {
        let used_bytes = self.usage.read();
        let quota_gb = self.quota_gb();
        let free_bytes = quota_gb * GIB;
        QuotaStatus {
            used_bytes,
            quota_gb,
            free_bytes,
            total_bytes: used_bytes.saturating_add(free_bytes),
            hard_limit_bytes: self.hard_limit_bytes,
        }
    }
}
