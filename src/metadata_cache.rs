//! Metadata cache for resolved objects
//!
//! Memoizes successful resolver calls for the lifetime of the process. There
//! is no per-entry expiry: a background task clears the whole map on a fixed
//! interval.

use crate::error::Result;
use crate::metrics::StreamMetrics;
use crate::models::ObjectMetadata;
use crate::remote::ObjectResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cache mapping local object ids to resolved metadata
pub struct MetadataCache {
    resolver: Arc<dyn ObjectResolver>,
    entries: RwLock<HashMap<i64, Arc<ObjectMetadata>>>,
    metrics: Option<Arc<StreamMetrics>>,
}

impl MetadataCache {
    pub fn new(resolver: Arc<dyn ObjectResolver>) -> Self {
        MetadataCache {
            resolver,
            entries: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolve `object_id`, calling the resolver only on a miss
    ///
    /// Failures are not cached.
    pub async fn resolve(&self, object_id: i64) -> Result<Arc<ObjectMetadata>> {
        if let Some(metadata) = self.entries.read().await.get(&object_id) {
            debug!("Metadata cache hit for object {}", object_id);
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_hit();
            }
            return Ok(Arc::clone(metadata));
        }

        debug!("Metadata cache miss for object {}", object_id);
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let metadata = Arc::new(self.resolver.resolve_object(object_id).await?);
        self.entries
            .write()
            .await
            .insert(object_id, Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write().await;
            let removed = entries.len();
            entries.clear();
            removed
        };
        info!("Cleared metadata cache ({} entries)", removed);
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_clear();
        }
    }

    /// Number of cached objects
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn the task that clears the cache every `interval`
    ///
    /// The first clear happens one full interval after the call. Abort the
    /// returned handle to stop the task.
    pub fn spawn_cleaner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                cache.clear().await;
            }
        })
    }
}
