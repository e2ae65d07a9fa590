//! Metrics collection for the streaming engine
//!
//! Thread-safe counters built on atomic operations. They track requests by
//! outcome, metadata cache behaviour, chunk RPCs, shard handshakes and the
//! bytes moved between the store and clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for the streaming engine
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    // Request statistics
    total_requests: AtomicU64,
    range_requests: AtomicU64,
    full_requests: AtomicU64,
    head_requests: AtomicU64,

    // Rejections by status
    forbidden_requests: AtomicU64,
    not_found_requests: AtomicU64,
    unsatisfiable_requests: AtomicU64,
    failed_requests: AtomicU64,

    // Metadata cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_clears: AtomicU64,

    // Chunk RPC statistics
    total_chunk_requests: AtomicU64,
    failed_chunk_requests: AtomicU64,
    retried_chunk_requests: AtomicU64,

    // Session statistics
    handshakes: AtomicU64,
    failed_handshakes: AtomicU64,
    session_invalidations: AtomicU64,

    // Byte statistics
    bytes_from_store: AtomicU64,
    bytes_to_client: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_request_duration_us: AtomicU64,
    total_chunk_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub range_requests: u64,
    pub full_requests: u64,
    pub head_requests: u64,

    pub forbidden_requests: u64,
    pub not_found_requests: u64,
    pub unsatisfiable_requests: u64,
    pub failed_requests: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_clears: u64,

    pub total_chunk_requests: u64,
    pub failed_chunk_requests: u64,
    pub retried_chunk_requests: u64,

    pub handshakes: u64,
    pub failed_handshakes: u64,
    pub session_invalidations: u64,

    pub bytes_from_store: u64,
    pub bytes_to_client: u64,

    pub total_request_duration_us: u64,
    pub total_chunk_duration_us: u64,
}

impl StreamMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that was served
    ///
    /// # Arguments
    /// * `partial` - Whether the response was `206 Partial Content`
    /// * `head` - Whether the request was a HEAD request
    pub fn record_request(&self, partial: bool, head: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.range_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.full_requests.fetch_add(1, Ordering::Relaxed);
        }
        if head {
            self.head_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request answered with an error status
    pub fn record_rejection(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            403 => &self.forbidden_requests,
            404 => &self.not_found_requests,
            416 => &self.unsatisfiable_requests,
            _ => &self.failed_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a metadata cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a metadata cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a full metadata cache clear
    pub fn record_cache_clear(&self) {
        self.cache_clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk RPC
    ///
    /// # Arguments
    /// * `success` - Whether the RPC returned data
    pub fn record_chunk_request(&self, success: bool) {
        self.total_chunk_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_chunk_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a chunk RPC retry
    pub fn record_chunk_retry(&self) {
        self.retried_chunk_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a shard handshake
    pub fn record_handshake(&self, success: bool) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_handshakes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a discarded shard session
    pub fn record_session_invalidation(&self) {
        self.session_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes received from the store
    pub fn record_bytes_from_store(&self, bytes: u64) {
        self.bytes_from_store.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes sent to the client
    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record time until response headers were ready
    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record duration of a single chunk RPC
    pub fn record_chunk_duration(&self, duration: Duration) {
        self.total_chunk_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded one by one, so a snapshot taken under load is not
    /// perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            range_requests: self.range_requests.load(Ordering::Relaxed),
            full_requests: self.full_requests.load(Ordering::Relaxed),
            head_requests: self.head_requests.load(Ordering::Relaxed),
            forbidden_requests: self.forbidden_requests.load(Ordering::Relaxed),
            not_found_requests: self.not_found_requests.load(Ordering::Relaxed),
            unsatisfiable_requests: self.unsatisfiable_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_clears: self.cache_clears.load(Ordering::Relaxed),
            total_chunk_requests: self.total_chunk_requests.load(Ordering::Relaxed),
            failed_chunk_requests: self.failed_chunk_requests.load(Ordering::Relaxed),
            retried_chunk_requests: self.retried_chunk_requests.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            failed_handshakes: self.failed_handshakes.load(Ordering::Relaxed),
            session_invalidations: self.session_invalidations.load(Ordering::Relaxed),
            bytes_from_store: self.bytes_from_store.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
            total_chunk_duration_us: self.total_chunk_duration_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Metadata cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Average time to response headers in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        let served = self.range_requests + self.full_requests;
        if served == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / served as f64) / 1000.0
        }
    }

    /// Average chunk RPC duration in milliseconds
    pub fn avg_chunk_duration_ms(&self) -> f64 {
        if self.total_chunk_requests == 0 {
            0.0
        } else {
            (self.total_chunk_duration_us as f64 / self.total_chunk_requests as f64) / 1000.0
        }
    }

    /// Chunk RPC failure rate as a percentage (0.0 to 100.0)
    pub fn chunk_failure_rate(&self) -> f64 {
        if self.total_chunk_requests == 0 {
            0.0
        } else {
            (self.failed_chunk_requests as f64 / self.total_chunk_requests as f64) * 100.0
        }
    }
}
