//! Shared trait abstractions
//!
//! Small traits and value types used across the layer, cache and paging
//! modules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives progress from long-running data requests and can cancel them.
pub trait ProgressCallback: Send + Sync {
    /// Whether the caller has abandoned the request.
    fn is_canceled(&self) -> bool {
        false
    }

    /// Reports progress. Returns `true` when the request should stop.
    fn report_progress(&self, _current: f64, _total: f64) -> bool {
        self.is_canceled()
    }
}

/// A progress callback that only carries a cancellation flag.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }
}

impl ProgressCallback for CancelFlag {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Lock-free hit/miss counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record<T>(&self, lookup: Option<T>) -> Option<T> {
        if lookup.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        lookup
    }

    pub fn snapshot(&self, size: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
        }
    }
}
