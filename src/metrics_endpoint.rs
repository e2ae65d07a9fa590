//! Metrics HTTP Endpoint
//!
//! Renders [`StreamMetrics`] and the shard registry in Prometheus text
//! format, plus small `/health` and `/stats` responses. The same handlers are
//! mounted on the main listener and, when configured, on a standalone
//! metrics listener.

use crate::metrics::{MetricsSnapshot, StreamMetrics};
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Standalone metrics server
pub struct MetricsEndpoint {
    metrics: Arc<StreamMetrics>,
    registry: Option<Registry>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use media_stream::metrics::StreamMetrics;
    /// use media_stream::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(StreamMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<StreamMetrics>, addr: SocketAddr) -> Self {
        Self {
            metrics,
            registry: None,
            addr,
        }
    }

    /// Also expose the metrics gathered by `registry`
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Serve `/metrics`, `/health` and `/stats` until the task is dropped
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}/metrics", self.addr);

        let metrics = self.metrics;
        let registry = self.registry;

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&metrics);
            let registry = registry.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let response = match req.uri().path() {
                        "/metrics" => metrics_response(&metrics, registry.as_ref()),
                        "/stats" => stats_response(&metrics),
                        "/health" => health_response(),
                        _ => not_found_response(),
                    };
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

/// Build a response with a fixed body and content type
pub fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Prometheus text for the counters and, if given, the shard registry
pub fn metrics_response(
    metrics: &StreamMetrics,
    registry: Option<&Registry>,
) -> Response<Full<Bytes>> {
    let mut body = format_prometheus_metrics(&metrics.get_stats());

    if let Some(registry) = registry {
        let mut buffer = Vec::new();
        match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
            Ok(()) => body.push_str(&String::from_utf8_lossy(&buffer)),
            Err(e) => warn!("Failed to encode shard metrics: {}", e),
        }
    }

    text_response(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, body)
}

/// JSON snapshot of the counters
pub fn stats_response(metrics: &StreamMetrics) -> Response<Full<Bytes>> {
    let s = metrics.get_stats();
    let body = serde_json::json!({
        "requests": {
            "total": s.total_requests,
            "range": s.range_requests,
            "full": s.full_requests,
            "head": s.head_requests,
            "forbidden": s.forbidden_requests,
            "not_found": s.not_found_requests,
            "unsatisfiable": s.unsatisfiable_requests,
            "failed": s.failed_requests,
        },
        "cache": {
            "hits": s.cache_hits,
            "misses": s.cache_misses,
            "clears": s.cache_clears,
            "hit_rate": s.cache_hit_rate(),
        },
        "chunks": {
            "total": s.total_chunk_requests,
            "failed": s.failed_chunk_requests,
            "retried": s.retried_chunk_requests,
            "avg_duration_ms": s.avg_chunk_duration_ms(),
        },
        "sessions": {
            "handshakes": s.handshakes,
            "failed_handshakes": s.failed_handshakes,
            "invalidations": s.session_invalidations,
        },
        "bytes": {
            "from_store": s.bytes_from_store,
            "to_client": s.bytes_to_client,
        },
    });

    text_response(StatusCode::OK, "application/json", body.to_string())
}

pub fn health_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#)
}

pub fn not_found_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found")
}

fn write_metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP media_stream_{} {}", name, help);
    let _ = writeln!(out, "# TYPE media_stream_{} {}", name, kind);
    let _ = writeln!(out, "media_stream_{} {}", name, value);
    out.push('\n');
}

/// Format counters in Prometheus exposition format
pub fn format_prometheus_metrics(s: &MetricsSnapshot) -> String {
    let mut out = String::new();

    write_metric(&mut out, "requests_total", "counter", "Total number of media requests", s.total_requests);
    write_metric(&mut out, "range_requests_total", "counter", "Requests answered with 206", s.range_requests);
    write_metric(&mut out, "full_requests_total", "counter", "Requests answered with 200", s.full_requests);
    write_metric(&mut out, "head_requests_total", "counter", "HEAD requests served", s.head_requests);
    write_metric(&mut out, "forbidden_requests_total", "counter", "Requests with a wrong capability hash", s.forbidden_requests);
    write_metric(&mut out, "not_found_requests_total", "counter", "Requests for unknown objects", s.not_found_requests);
    write_metric(&mut out, "unsatisfiable_requests_total", "counter", "Requests with an invalid range", s.unsatisfiable_requests);
    write_metric(&mut out, "failed_requests_total", "counter", "Requests that failed with a server error", s.failed_requests);

    write_metric(&mut out, "cache_hits_total", "counter", "Metadata cache hits", s.cache_hits);
    write_metric(&mut out, "cache_misses_total", "counter", "Metadata cache misses", s.cache_misses);
    write_metric(&mut out, "cache_clears_total", "counter", "Full metadata cache clears", s.cache_clears);
    write_metric(&mut out, "cache_hit_rate", "gauge", "Metadata cache hit rate percentage", format!("{:.2}", s.cache_hit_rate()));

    write_metric(&mut out, "chunks_total", "counter", "Chunk reads issued to the store", s.total_chunk_requests);
    write_metric(&mut out, "failed_chunks_total", "counter", "Chunk reads that failed", s.failed_chunk_requests);
    write_metric(&mut out, "retried_chunks_total", "counter", "Chunk reads that were retried", s.retried_chunk_requests);
    write_metric(&mut out, "chunk_failure_rate", "gauge", "Chunk read failure rate percentage", format!("{:.2}", s.chunk_failure_rate()));

    write_metric(&mut out, "session_handshakes_total", "counter", "Shard handshakes performed", s.handshakes);
    write_metric(&mut out, "failed_session_handshakes_total", "counter", "Shard handshakes that failed", s.failed_handshakes);
    write_metric(&mut out, "session_invalidations_total", "counter", "Shard sessions discarded", s.session_invalidations);

    write_metric(&mut out, "bytes_from_store_total", "counter", "Bytes received from the store", s.bytes_from_store);
    write_metric(&mut out, "bytes_to_client_total", "counter", "Bytes sent to clients", s.bytes_to_client);

    write_metric(&mut out, "request_duration_ms_avg", "gauge", "Average time to response headers in milliseconds", format!("{:.2}", s.avg_request_duration_ms()));
    write_metric(&mut out, "chunk_duration_ms_avg", "gauge", "Average chunk read duration in milliseconds", format!("{:.2}", s.avg_chunk_duration_ms()));

    out
}
