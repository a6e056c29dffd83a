// Server module - background cache maintenance service

use async_trait::async_trait;
use pingora_core::server::ShutdownWatch;
use pingora_core::services::background::BackgroundService;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TieredCache;

/// Periodic cache maintenance.
///
/// Capacity is enforced by sweep, not at insert time: the memory tier may
/// run over its limits between ticks, and each tick evicts oldest-first
/// until both the item and byte bounds hold again. Each tick also logs a
/// tier-counter snapshot.
pub struct CacheMaintenance {
    cache: Arc<TieredCache>,
    interval: Duration,
}

impl CacheMaintenance {
    pub fn new(cache: Arc<TieredCache>, sweep_interval_seconds: u64) -> Self {
        Self {
            cache,
            interval: Duration::from_secs(sweep_interval_seconds),
        }
    }

    fn tick(&self) {
        let evicted = self.cache.sweep_memory();
        let stats = self.cache.stats();
        tracing::debug!(
            evicted = evicted,
            memory_hits = stats.memory_hits,
            disk_hits = stats.disk_hits,
            misses = stats.misses,
            hit_rate = format!("{:.3}", stats.hit_rate()),
            size_bytes = stats.current_size_bytes,
            item_count = stats.current_item_count,
            "Cache sweep completed"
        );
    }
}

#[async_trait]
impl BackgroundService for CacheMaintenance {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so a fresh start does
        // not sweep an empty cache
        ticker.tick().await;

        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            "Cache maintenance service started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Cache maintenance service shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}
