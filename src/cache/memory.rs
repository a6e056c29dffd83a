//! Memory cache implementation
//!
//! Bounded, insertion-ordered key/entry map. Eviction is strict FIFO by
//! insertion time; `get` never reorders a key. Do not change this to LRU,
//! it changes observable eviction order.
//!
//! Bounds are enforced by a periodic sweep (see `server::CacheMaintenance`),
//! not at `set` time, so occupancy may transiently exceed the configured
//! limits between sweeps.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::entry::{CacheEntry, CacheKey};
use super::error::CacheError;
use super::traits::Cache;

struct StoreInner {
    /// Insertion order == eviction order
    keys: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, CacheEntry>,
    /// Exact sum of stored entry payload sizes
    total_bytes: u64,
}

/// Bounded in-memory FIFO store
pub struct MemoryCache {
    inner: Mutex<StoreInner>,
    max_items: u64,
    max_bytes: u64,
}

impl MemoryCache {
    pub fn new(max_items: u64, max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                keys: VecDeque::new(),
                entries: HashMap::new(),
                total_bytes: 0,
            }),
            max_items,
            max_bytes,
        }
    }

    /// Look up an entry. Never reorders the key.
    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Insert an entry. An existing entry for the same key is removed first
    /// (its byte contribution with it), then the key is re-inserted at the
    /// newest position, so overwrites reset eviction priority.
    pub fn set_entry(&self, key: CacheKey, entry: CacheEntry) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.remove(&key) {
            inner.total_bytes -= old.payload_size() as u64;
            inner.keys.retain(|k| k != &key);
        }
        inner.total_bytes += entry.payload_size() as u64;
        inner.keys.push_back(key.clone());
        inner.entries.insert(key, entry);
    }

    /// Evict the oldest key. Returns the evicted key, or None when empty.
    pub fn evict_one(&self) -> Option<CacheKey> {
        let mut inner = self.inner.lock();
        let key = inner.keys.pop_front()?;
        if let Some(entry) = inner.entries.remove(&key) {
            inner.total_bytes -= entry.payload_size() as u64;
        }
        Some(key)
    }

    /// Evict oldest keys while either bound is exceeded.
    /// Returns the number of entries evicted.
    pub fn sweep(&self) -> usize {
        let mut evicted = 0;
        while self.over_capacity() {
            if self.evict_one().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    fn over_capacity(&self) -> bool {
        let inner = self.inner.lock();
        inner.total_bytes > self.max_bytes || inner.entries.len() as u64 > self.max_items
    }

    pub fn item_count(&self) -> u64 {
        self.inner.lock().entries.len() as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.get_entry(key))
    }

    async fn set(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.set_entry(key, entry);
        Ok(())
    }
}
