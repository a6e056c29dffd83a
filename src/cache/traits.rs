//! Cache trait definition
//!
//! Defines the `Cache` trait shared by the memory tier, the disk tier and
//! the tiered composite, so backends stay interchangeable behind one
//! `get`/`set` interface.

use async_trait::async_trait;

use super::entry::{CacheEntry, CacheKey};
use super::error::CacheError;

/// Cache interface implemented by each backend and by the tiered composite
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get a cache entry by key. Returns None when the key is absent or the
    /// stored representation could not be decoded.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry. Overwrites an existing entry for the same key.
    async fn set(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError>;
}
