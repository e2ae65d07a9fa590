//! Chunk streamer for reading objects from the store
//!
//! Turns a [`StreamPlan`] into a lazy stream of byte slices. Chunks are
//! requested strictly one after another, in ascending offset order, and only
//! when the consumer polls for more data. Dropping the stream stops any
//! further chunk reads.

use crate::error::{Result, StreamError};
use crate::file_id::ObjectReference;
use crate::metrics::StreamMetrics;
use crate::session_manager::SessionManager;
use crate::shard_metrics::ShardMetrics;
use crate::stream_plan::StreamPlan;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Stream of trimmed chunk data
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Retry policy for failed chunk reads
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries
    pub max_retries: usize,
    /// Backoff durations in milliseconds for each retry attempt
    pub backoff_ms: Vec<u64>,
}

impl RetryPolicy {
    /// Create a new retry policy with exponential backoff
    pub fn new(max_retries: usize) -> Self {
        // 100ms, 200ms, 400ms, ...
        let backoff_ms = (0..max_retries)
            .map(|i| 100 * 2u64.pow(i as u32))
            .collect();

        RetryPolicy {
            max_retries,
            backoff_ms,
        }
    }

    /// Check if we should retry based on the attempt number and error
    pub fn should_retry(&self, attempt: usize, error: &StreamError) -> bool {
        attempt < self.max_retries && (error.should_retry() || error.invalidates_session())
    }

    /// Get the backoff duration for a given attempt
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let ms = self
            .backoff_ms
            .get(attempt)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(100);
        Duration::from_millis(ms)
    }
}

/// Reads planned chunks through shard sessions
#[derive(Clone)]
pub struct ChunkStreamer {
    sessions: Arc<SessionManager>,
    retry_policy: RetryPolicy,
    metrics: Option<Arc<StreamMetrics>>,
    shard_metrics: Option<ShardMetrics>,
}

impl ChunkStreamer {
    /// Create a streamer retrying each chunk up to `max_retries` times
    pub fn new(sessions: Arc<SessionManager>, max_retries: usize) -> Self {
        ChunkStreamer {
            sessions,
            retry_policy: RetryPolicy::new(max_retries),
            metrics: None,
            shard_metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_shard_metrics(mut self, shard_metrics: ShardMetrics) -> Self {
        self.shard_metrics = Some(shard_metrics);
        self
    }

    /// Authenticate with `shard_id` ahead of the first chunk read
    ///
    /// Later reads reuse the session, so a handshake failure can be reported
    /// before any response bytes are committed.
    pub async fn ensure_session(&self, shard_id: i32) -> Result<()> {
        self.sessions.get_session(shard_id).await.map(|_| ())
    }

    /// Stream the bytes `plan` describes
    ///
    /// Yields at most `plan.part_count` slices. An empty chunk from the
    /// store ends the stream early without an error.
    pub fn stream(&self, reference: ObjectReference, plan: StreamPlan) -> ByteStream {
        let streamer = self.clone();

        let stream = async_stream::try_stream! {
            for index in 0..plan.part_count {
                let offset = plan.chunk_offset(index);
                let chunk = streamer
                    .fetch_chunk(&reference, offset, plan.chunk_size)
                    .await?;

                if chunk.is_empty() {
                    debug!(
                        "Store returned no data at offset {}, ending stream after {} of {} chunks",
                        offset, index, plan.part_count
                    );
                    break;
                }

                let piece = plan.slice_chunk(index, &chunk);
                if piece.is_empty() {
                    continue;
                }
                if let Some(metrics) = &streamer.metrics {
                    metrics.record_bytes_to_client(piece.len() as u64);
                }
                yield piece;
            }
        };

        Box::pin(stream)
    }

    /// Read one chunk, retrying transient failures
    ///
    /// A session reported as no longer authorized is discarded and the same
    /// offset is read again through a fresh session.
    pub async fn fetch_chunk(
        &self,
        reference: &ObjectReference,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes> {
        let shard_id = reference.shard_id;
        let mut attempt = 0;

        loop {
            let session = self.sessions.get_session(shard_id).await?;

            let started = Instant::now();
            let result = self
                .sessions
                .store()
                .read_chunk(&session, reference, offset, limit)
                .await;
            let elapsed = started.elapsed();

            if let Some(metrics) = &self.metrics {
                metrics.record_chunk_request(result.is_ok());
                metrics.record_chunk_duration(elapsed);
            }
            if let Some(shard_metrics) = &self.shard_metrics {
                shard_metrics.record_chunk(shard_id, result.is_ok(), elapsed.as_secs_f64());
            }

            let error = match result {
                Ok(chunk) => {
                    debug!(
                        "Read {} bytes at offset {} from shard {} in {:?}",
                        chunk.len(),
                        offset,
                        shard_id,
                        elapsed
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_bytes_from_store(chunk.len() as u64);
                    }
                    return Ok(chunk);
                }
                Err(e) => e,
            };

            if !self.retry_policy.should_retry(attempt, &error) {
                if error.should_retry() || error.invalidates_session() {
                    return Err(StreamError::ChunkFailed {
                        offset,
                        attempts: attempt + 1,
                    });
                }
                return Err(error);
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_chunk_retry();
            }

            if error.invalidates_session() {
                warn!(
                    "Session for shard {} rejected at offset {}, re-authorizing",
                    shard_id, offset
                );
                self.sessions.invalidate(&session).await;
            } else {
                let backoff = self.retry_policy.backoff_duration(attempt);
                warn!(
                    "Chunk read at offset {} failed (attempt {}), retrying after {:?}: {}",
                    offset,
                    attempt + 1,
                    backoff,
                    error
                );
                sleep(backoff).await;
            }

            attempt += 1;
        }
    }
}
