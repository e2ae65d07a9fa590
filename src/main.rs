//! Media streaming server
//!
//! Loads configuration, sets up logging and serves media routes until Ctrl-C.

use anyhow::Context;
use media_stream::metrics_endpoint::MetricsEndpoint;
use media_stream::{MediaService, StreamConfig};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

/// # Usage
/// ```bash
/// # Start with default config (config/media_stream.yaml)
/// media-stream
///
/// # Start with custom config
/// media-stream /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/media_stream.yaml".to_string());

    let config = StreamConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let level: LevelFilter = config.log_level.parse().unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting media stream server");
    info!("Configuration loaded from {}", config_path);
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Gateway: {}", config.gateway_url);
    info!("  - Primary shard: {}", config.primary_shard);
    info!("  - Max chunk size: {} KB", config.max_chunk_size / 1024);
    info!("  - Cache clear interval: {} seconds", config.cache_clear_interval_secs);

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen_address {}", config.listen_address))?;

    let service = MediaService::from_config(config.clone())?;
    let cleaner = service.spawn_cache_cleaner();

    let metrics_task = match &config.metrics_endpoint {
        Some(endpoint) if endpoint.enabled => {
            let metrics_addr: SocketAddr = endpoint
                .address
                .parse()
                .with_context(|| format!("Invalid metrics address {}", endpoint.address))?;
            let server = MetricsEndpoint::new(Arc::clone(service.metrics()), metrics_addr)
                .with_registry(service.registry().clone());
            Some(tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Metrics endpoint failed: {}", e);
                }
            }))
        }
        _ => None,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    service
        .server()
        .serve(addr, shutdown)
        .await
        .with_context(|| format!("Failed to serve on {}", addr))?;

    cleaner.abort();
    if let Some(task) = metrics_task {
        task.abort();
    }
    service.sessions().shutdown().await;

    let stats = service.metrics().get_stats();
    info!(
        "Server stopped: {} requests, {} bytes sent",
        stats.total_requests, stats.bytes_to_client
    );
    Ok(())
}
