//! Cache statistics types
//!
//! Tracks per-tier hit/miss counters for the tiered cache:
//! - `CacheStats`: point-in-time snapshot for diagnostic reporting
//! - `TierStatsTracker`: atomic counters shared across concurrent requests

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics snapshot for periodic diagnostic reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Memory-tier hits
    pub memory_hits: u64,
    /// Memory-tier misses (lookup fell through to the disk tier)
    pub memory_misses: u64,
    /// Disk-tier hits (entry promoted into memory on each one)
    pub disk_hits: u64,
    /// Disk-tier misses (only counted when a disk tier is configured)
    pub disk_misses: u64,
    /// Total misses (every configured tier missed)
    pub misses: u64,
    /// Current memory tier size in bytes
    pub current_size_bytes: u64,
    /// Current number of items in the memory tier
    pub current_item_count: u64,
    /// Configured memory tier byte bound
    pub max_size_bytes: u64,
}

impl CacheStats {
    /// Aggregate hits across both tiers
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    /// Hit rate (hits / total lookups), 0.0 when there are no lookups
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Atomic hit/miss counters. Updates are lock-free; no cross-request
/// serialization of lookup decisions happens here.
pub struct TierStatsTracker {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    disk_hits: AtomicU64,
    disk_misses: AtomicU64,
    misses: AtomicU64,
}

impl TierStatsTracker {
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            memory_misses: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            disk_misses: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_miss(&self) {
        self.disk_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters together with memory-tier occupancy figures
    pub fn snapshot(
        &self,
        current_size_bytes: u64,
        current_item_count: u64,
        max_size_bytes: u64,
    ) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_misses: self.disk_misses.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            current_size_bytes,
            current_item_count,
            max_size_bytes,
        }
    }
}

impl Default for TierStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
