//! Media Stream
//!
//! Serves objects held in a remote, shard-partitioned object store as
//! HTTP-range-compliant streams and downloads, without copying whole objects
//! to local disk first.
//!
//! # Overview
//!
//! A client asks for a byte range of a named object. The service resolves the
//! object id to an [`ObjectReference`] (memoized in the [`MetadataCache`]),
//! checks the capability hash carried by the URL, validates the `Range`
//! header, and plans a sequence of fixed-size chunk reads ([`StreamPlan`]).
//! The [`ChunkStreamer`] issues those reads one at a time through a shared,
//! authenticated per-shard session ([`SessionManager`]) and trims the first
//! and last chunk to the exact requested boundary. Bytes reach the client in
//! ascending offset order as they arrive.
//!
//! # Features
//!
//! - **Range Requests**: `bytes=a-b`, `bytes=a-` and `bytes=-n`; anything else
//!   is answered with `416` and `Content-Range: bytes */<size>`
//! - **Adaptive Chunking**: 256 KiB / 512 KiB / 1 MiB chunks depending on the
//!   requested length
//! - **Single-Flight Sessions**: concurrent requests for a new shard share one
//!   handshake
//! - **Lazy Streaming**: the next chunk is read only when the client is ready
//!   for it; a disconnect stops further reads
//! - **Capability Hashes**: URLs must carry the first characters of the
//!   object's unique id
//! - **Metrics**: atomic counters and per-shard Prometheus metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use media_stream::{MediaService, StreamConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::from_file("config/media_stream.yaml")?;
//! let addr = config.listen_address.parse()?;
//!
//! let service = MediaService::from_config(config)?;
//! let _cleaner = service.spawn_cache_cleaner();
//! service.server().serve(addr, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Routes
//!
//! | Path | Disposition |
//! |------|-------------|
//! | `/stream/{id}?hash={hash}` | inline |
//! | `/download/{id}/{name}?hash={hash}` | attachment |
//! | `/{hash}{id}` | inline |
//! | `/{id}[/{name}]?hash={hash}` | inline |
//! | `/health`, `/metrics`, `/stats` | |
//!
//! All media routes accept `GET` and `HEAD`.
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:8080"
//! gateway_url: "http://127.0.0.1:8081"
//! primary_shard: 2
//! hash_length: 6
//! cache_clear_interval_secs: 1800
//! max_auth_attempts: 6
//! max_chunk_retries: 3
//! max_chunk_size: 1048576
//! ```
//!
//! See [`StreamConfig`] for every option.
//!
//! # Error Handling
//!
//! Every failure is a [`StreamError`]; [`StreamError::to_http_status`] maps
//! it onto the response status.
//!
//! ```rust,no_run
//! use media_stream::{StreamConfig, StreamError};
//!
//! match StreamConfig::from_file("config.yaml") {
//!     Ok(_) => println!("Config loaded successfully"),
//!     Err(StreamError::ConfigError(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

pub mod chunk_streamer;
pub mod config;
pub mod error;
pub mod file_id;
pub mod gateway;
pub mod handler;
pub mod metadata_cache;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod remote;
pub mod request_analyzer;
pub mod response_builder;
pub mod server;
pub mod service;
pub mod session_manager;
pub mod shard_metrics;
pub mod stream_plan;

// Re-export commonly used types
pub use chunk_streamer::{ByteStream, ChunkStreamer, RetryPolicy};
pub use config::{MetricsEndpointConfig, StreamConfig};
pub use error::{Result, StreamError};
pub use file_id::{FileKind, ObjectReference, ThumbnailDescriptor, ThumbnailSource};
pub use gateway::GatewayClient;
pub use handler::{MediaHandler, ResponseBody};
pub use metadata_cache::MetadataCache;
pub use metrics::{MetricsSnapshot, StreamMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{ByteRange, ObjectMetadata};
pub use remote::{Credential, ExportedAuthorization, ObjectResolver, RemoteStore};
pub use request_analyzer::{MediaRequest, RequestAnalyzer};
pub use response_builder::{Disposition, ResponseBuilder};
pub use server::StreamServer;
pub use service::MediaService;
pub use session_manager::{SessionManager, ShardSession};
pub use shard_metrics::ShardMetrics;
pub use stream_plan::StreamPlan;
