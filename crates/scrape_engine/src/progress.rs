//! Live run counters, updated atomically after every individual resolution.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::info;

use common::{FetchResolution, FetchStatus, MonthRequestKey};

/// Point-in-time snapshot of the counters, suitable for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub empty: usize,
    pub failed: usize,
    pub fallback_used: usize,
    pub cache_hits: usize,
}

#[derive(Debug)]
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
    successful: AtomicUsize,
    empty: AtomicUsize,
    failed: AtomicUsize,
    fallback_used: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            successful: AtomicUsize::new(0),
            empty: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            fallback_used: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, key: &MonthRequestKey, resolution: &FetchResolution) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        match resolution.status {
            FetchStatus::Success => self.successful.fetch_add(1, Ordering::Relaxed),
            FetchStatus::Empty => self.empty.fetch_add(1, Ordering::Relaxed),
            FetchStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        if resolution.used_fallback {
            self.fallback_used.fetch_add(1, Ordering::Relaxed);
        }
        if resolution.from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }

        let snap = self.snapshot();
        info!(
            "[{completed}/{}] {key}: {} (ok={} empty={} failed={} fallback={} cache={})",
            self.total,
            match resolution.status {
                FetchStatus::Success => "ok",
                FetchStatus::Empty => "empty",
                FetchStatus::Failed => "FAILED",
            },
            snap.successful,
            snap.empty,
            snap.failed,
            snap.fallback_used,
            snap.cache_hits,
        );
    }

    pub fn snapshot(&self) -> RunStats {
        RunStats {
            total: self.total,
            completed: self.completed.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
