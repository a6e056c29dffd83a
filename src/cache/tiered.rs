//! Tiered cache implementation - memory tier backed by a disk tier
//!
//! Read-through composite: memory first, then disk; a disk hit is promoted
//! into memory so subsequent lookups stay fast. Writes go through to both
//! tiers; a disk write failure never rolls back the memory write.

use async_trait::async_trait;
use std::sync::Arc;

use super::disk::DiskCache;
use super::entry::{CacheEntry, CacheKey};
use super::error::CacheError;
use super::memory::MemoryCache;
use super::stats::{CacheStats, TierStatsTracker};
use super::traits::Cache;

/// Which tier satisfied a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Memory,
    Disk,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheSource::Memory => write!(f, "memory"),
            CacheSource::Disk => write!(f, "disk"),
        }
    }
}

/// Two-tier composite cache
pub struct TieredCache {
    memory: Arc<MemoryCache>,
    disk: Option<DiskCache>,
    stats: TierStatsTracker,
}

impl TieredCache {
    pub fn new(memory: MemoryCache, disk: Option<DiskCache>) -> Self {
        Self {
            memory: Arc::new(memory),
            disk,
            stats: TierStatsTracker::new(),
        }
    }

    /// Look up an entry and report which tier held it.
    /// A disk hit is promoted into the memory tier.
    pub async fn get_with_source(&self, key: &CacheKey) -> Option<(CacheSource, CacheEntry)> {
        if let Some(entry) = self.memory.get_entry(key) {
            self.stats.record_memory_hit();
            return Some((CacheSource::Memory, entry));
        }
        self.stats.record_memory_miss();

        if let Some(disk) = &self.disk {
            if let Some(entry) = disk.get_entry(key).await {
                self.stats.record_disk_hit();
                self.memory.set_entry(key.clone(), entry.clone());
                return Some((CacheSource::Disk, entry));
            }
            self.stats.record_disk_miss();
        }

        self.stats.record_miss();
        None
    }

    /// Write-through to both tiers. The disk write is best-effort and its
    /// failure is invisible to callers.
    pub async fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.memory.set_entry(key.clone(), entry.clone());
        if let Some(disk) = &self.disk {
            disk.set_entry(&key, &entry).await;
        }
    }

    /// Evict oldest memory entries while over the configured bounds
    pub fn sweep_memory(&self) -> usize {
        self.memory.sweep()
    }

    /// Snapshot hit/miss counters and memory occupancy
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(
            self.memory.total_bytes(),
            self.memory.item_count(),
            self.memory.max_bytes(),
        )
    }
}

#[async_trait]
impl Cache for TieredCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.get_with_source(key).await.map(|(_, entry)| entry))
    }

    async fn set(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.put(key, entry).await;
        Ok(())
    }
}
