// Cache module

pub mod disk;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod memory;
pub mod stats;
pub mod tiered;
pub mod traits;

pub use disk::DiskCache;
pub use entry::{unix_now, CacheEntry, CacheKey};
pub use error::CacheError;
pub use freshness::{CacheControl, Freshness};
pub use memory::MemoryCache;
pub use stats::CacheStats;
pub use tiered::{CacheSource, TieredCache};
pub use traits::Cache;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub memory: MemoryCacheConfig,
    #[serde(default)]
    pub disk: DiskCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    #[serde(default = "default_max_items")]
    pub max_items: u64,
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_cache_size_mb: default_max_cache_size_mb(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_max_items() -> u64 {
    1000
}

fn default_max_cache_size_mb() -> u64 {
    256
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

impl MemoryCacheConfig {
    /// Convert max_cache_size_mb to bytes
    pub fn max_cache_size_bytes(&self) -> u64 {
        self.max_cache_size_mb * 1024 * 1024
    }

    /// Validate memory cache configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_items == 0 {
            return Err("max_items must be greater than zero".to_string());
        }
        if self.sweep_interval_seconds == 0 {
            return Err("sweep_interval_seconds must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "/var/cache/kagemusha".to_string()
}

impl DiskCacheConfig {
    /// Validate disk cache configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.cache_dir.is_empty() {
            return Err("cache_dir cannot be empty when disk cache is enabled".to_string());
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Build the tiered cache described by this configuration
    pub fn build(&self) -> TieredCache {
        let memory = MemoryCache::new(self.memory.max_items, self.memory.max_cache_size_bytes());
        let disk = if self.disk.enabled {
            Some(DiskCache::new(&self.disk.cache_dir))
        } else {
            None
        };
        TieredCache::new(memory, disk)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.memory.validate()?;
        self.disk.validate()?;
        Ok(())
    }
}
