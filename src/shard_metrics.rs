//! Prometheus metrics for per-shard RPC traffic

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, Registry,
};
use std::sync::Arc;

const CHUNK_LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Metrics for chunk RPCs and handshakes, labelled by shard
#[derive(Clone)]
pub struct ShardMetrics {
    /// Chunk RPCs by shard and result (success/failure)
    pub chunk_requests_total: Arc<CounterVec>,

    /// Chunk RPC latency by shard
    pub chunk_duration_seconds: Arc<HistogramVec>,

    /// Handshakes by shard and result (success/failure)
    pub handshakes_total: Arc<CounterVec>,

    /// Rejected authorization imports by shard
    pub auth_retries_total: Arc<CounterVec>,
}

impl ShardMetrics {
    /// Create shard metrics on the default registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let chunk_requests_total = register_counter_vec!(
            "media_stream_chunk_requests_total",
            "Total number of chunk RPCs by shard and result",
            &["shard", "result"]
        )?;

        let chunk_duration_seconds = register_histogram_vec!(
            "media_stream_chunk_duration_seconds",
            "Duration of chunk RPCs in seconds",
            &["shard"],
            CHUNK_LATENCY_BUCKETS.to_vec()
        )?;

        let handshakes_total = register_counter_vec!(
            "media_stream_handshakes_total",
            "Total number of shard handshakes by result",
            &["shard", "result"]
        )?;

        let auth_retries_total = register_counter_vec!(
            "media_stream_auth_retries_total",
            "Total number of rejected authorization imports",
            &["shard"]
        )?;

        Ok(Self {
            chunk_requests_total: Arc::new(chunk_requests_total),
            chunk_duration_seconds: Arc::new(chunk_duration_seconds),
            handshakes_total: Arc::new(handshakes_total),
            auth_retries_total: Arc::new(auth_retries_total),
        })
    }

    /// Create shard metrics on a custom registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let chunk_requests_total = CounterVec::new(
            prometheus::Opts::new(
                "media_stream_chunk_requests_total",
                "Total number of chunk RPCs by shard and result",
            ),
            &["shard", "result"],
        )?;
        registry.register(Box::new(chunk_requests_total.clone()))?;

        let chunk_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "media_stream_chunk_duration_seconds",
                "Duration of chunk RPCs in seconds",
            )
            .buckets(CHUNK_LATENCY_BUCKETS.to_vec()),
            &["shard"],
        )?;
        registry.register(Box::new(chunk_duration_seconds.clone()))?;

        let handshakes_total = CounterVec::new(
            prometheus::Opts::new(
                "media_stream_handshakes_total",
                "Total number of shard handshakes by result",
            ),
            &["shard", "result"],
        )?;
        registry.register(Box::new(handshakes_total.clone()))?;

        let auth_retries_total = CounterVec::new(
            prometheus::Opts::new(
                "media_stream_auth_retries_total",
                "Total number of rejected authorization imports",
            ),
            &["shard"],
        )?;
        registry.register(Box::new(auth_retries_total.clone()))?;

        Ok(Self {
            chunk_requests_total: Arc::new(chunk_requests_total),
            chunk_duration_seconds: Arc::new(chunk_duration_seconds),
            handshakes_total: Arc::new(handshakes_total),
            auth_retries_total: Arc::new(auth_retries_total),
        })
    }

    /// Record a chunk RPC and its latency
    pub fn record_chunk(&self, shard_id: i32, success: bool, duration_secs: f64) {
        let shard = shard_id.to_string();
        let result = if success { "success" } else { "failure" };
        self.chunk_requests_total
            .with_label_values(&[shard.as_str(), result])
            .inc();
        self.chunk_duration_seconds
            .with_label_values(&[shard.as_str()])
            .observe(duration_secs);
    }

    /// Record the outcome of a handshake
    pub fn record_handshake(&self, shard_id: i32, success: bool) {
        let shard = shard_id.to_string();
        let result = if success { "success" } else { "failure" };
        self.handshakes_total
            .with_label_values(&[shard.as_str(), result])
            .inc();
    }

    /// Record an authorization import rejected with bad auth bytes
    pub fn record_auth_retry(&self, shard_id: i32) {
        self.auth_retries_total
            .with_label_values(&[shard_id.to_string().as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_on_custom_registry() {
        let registry = Registry::new();
        let metrics = ShardMetrics::with_registry(&registry).unwrap();

        metrics.record_chunk(4, true, 0.02);
        metrics.record_chunk(4, false, 0.5);
        metrics.record_handshake(4, true);
        metrics.record_auth_retry(4);

        assert_eq!(
            metrics
                .chunk_requests_total
                .with_label_values(&["4", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .handshakes_total
                .with_label_values(&["4", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics.auth_retries_total.with_label_values(&["4"]).get(),
            1.0
        );

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "media_stream_chunk_duration_seconds"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        let _first = ShardMetrics::with_registry(&registry).unwrap();
        assert!(ShardMetrics::with_registry(&registry).is_err());
    }
}
