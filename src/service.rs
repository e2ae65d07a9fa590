//! Service wiring
//!
//! [`MediaService`] builds every shared component once at start-up (metrics,
//! shard session registry, metadata cache, chunk streamer, handler) and hands
//! them out behind `Arc`.

use crate::chunk_streamer::ChunkStreamer;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::gateway::GatewayClient;
use crate::handler::MediaHandler;
use crate::metadata_cache::MetadataCache;
use crate::metrics::StreamMetrics;
use crate::remote::{ObjectResolver, RemoteStore};
use crate::server::StreamServer;
use crate::session_manager::SessionManager;
use crate::shard_metrics::ShardMetrics;
use prometheus::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// All long-lived state of a running service
#[derive(Clone)]
pub struct MediaService {
    config: Arc<StreamConfig>,
    metrics: Arc<StreamMetrics>,
    registry: Registry,
    sessions: Arc<SessionManager>,
    cache: Arc<MetadataCache>,
    handler: Arc<MediaHandler>,
}

impl MediaService {
    /// Wire the service around the given collaborators
    ///
    /// # Example
    /// ```no_run
    /// use media_stream::{GatewayClient, MediaService, StreamConfig};
    /// use std::sync::Arc;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = StreamConfig::default();
    /// let gateway = Arc::new(GatewayClient::from_config(&config)?);
    /// let service = MediaService::new(config, gateway.clone(), gateway)?;
    /// println!("requests so far: {}", service.metrics().get_stats().total_requests);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        config: StreamConfig,
        store: Arc<dyn RemoteStore>,
        resolver: Arc<dyn ObjectResolver>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(StreamMetrics::new());
        let registry = Registry::new();
        let shard_metrics = ShardMetrics::with_registry(&registry).map_err(|e| {
            StreamError::InternalError(format!("Failed to register shard metrics: {}", e))
        })?;

        let sessions = Arc::new(
            SessionManager::new(store, config.max_auth_attempts)
                .with_metrics(Arc::clone(&metrics))
                .with_shard_metrics(shard_metrics.clone()),
        );
        let cache = Arc::new(MetadataCache::new(resolver).with_metrics(Arc::clone(&metrics)));
        let streamer = ChunkStreamer::new(Arc::clone(&sessions), config.max_chunk_retries)
            .with_metrics(Arc::clone(&metrics))
            .with_shard_metrics(shard_metrics);
        let handler = Arc::new(MediaHandler::new(
            &config,
            Arc::clone(&cache),
            streamer,
            Arc::clone(&metrics),
        ));

        info!(
            "Media service ready: primary_shard={}, hash_length={}, max_chunk_size={}",
            config.primary_shard, config.hash_length, config.max_chunk_size
        );

        Ok(MediaService {
            config: Arc::new(config),
            metrics,
            registry,
            sessions,
            cache,
            handler,
        })
    }

    /// Wire the service around an HTTP gateway client
    pub fn from_config(config: StreamConfig) -> Result<Self> {
        let gateway = Arc::new(GatewayClient::from_config(&config)?);
        Self::new(config, gateway.clone(), gateway)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// Registry holding the per-shard Prometheus metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn handler(&self) -> &Arc<MediaHandler> {
        &self.handler
    }

    /// HTTP server for the main listener
    pub fn server(&self) -> StreamServer {
        StreamServer::new(Arc::clone(&self.handler), Arc::clone(&self.metrics))
            .with_registry(self.registry.clone())
    }

    /// Start the periodic metadata cache clear
    pub fn spawn_cache_cleaner(&self) -> JoinHandle<()> {
        self.cache.spawn_cleaner(self.config.cache_clear_interval())
    }
}
