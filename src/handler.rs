//! HTTP range handler for media routes
//!
//! Resolves the requested object, enforces the capability hash, validates
//! the `Range` header and answers with a body that streams chunks from the
//! store as the client reads it. The shard session is established before
//! the status line is chosen, so an authorization failure is answered with
//! `503` rather than a truncated body.

use crate::chunk_streamer::ChunkStreamer;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::metadata_cache::MetadataCache;
use crate::metrics::StreamMetrics;
use crate::models::{ByteRange, ObjectMetadata};
use crate::request_analyzer::{MediaRequest, RequestAnalyzer};
use crate::response_builder::ResponseBuilder;
use crate::stream_plan::StreamPlan;
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::request::Parts;
use http::{Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Body type of every response the service produces
pub type ResponseBody = UnsyncBoxBody<Bytes, StreamError>;

/// Wrap a complete body
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Serves `/stream/`, `/download/` and compact media paths
pub struct MediaHandler {
    cache: Arc<MetadataCache>,
    streamer: ChunkStreamer,
    analyzer: RequestAnalyzer,
    builder: ResponseBuilder,
    hash_length: usize,
    max_chunk_size: u64,
    metrics: Arc<StreamMetrics>,
}

impl MediaHandler {
    pub fn new(
        config: &StreamConfig,
        cache: Arc<MetadataCache>,
        streamer: ChunkStreamer,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        MediaHandler {
            cache,
            streamer,
            analyzer: RequestAnalyzer::new(config.hash_length),
            builder: ResponseBuilder::new(),
            hash_length: config.hash_length,
            max_chunk_size: config.max_chunk_size,
            metrics,
        }
    }

    /// Handle a request if its path is a media route
    ///
    /// Returns `None` for paths this handler does not own.
    pub async fn handle(&self, req: &Parts) -> Option<Response<ResponseBody>> {
        let uri = &req.uri;
        let analyzed = self
            .analyzer
            .analyze(&req.method, uri.path(), uri.query(), &req.headers);

        let media = match analyzed {
            Ok(Some(media)) => media,
            Ok(None) => return None,
            Err(e) => return Some(self.error_response(&e)),
        };

        if !RequestAnalyzer::is_supported_method(&req.method) {
            debug!("Rejecting {} on media route {}", req.method, uri.path());
            let mut response = self.plain_response(StatusCode::METHOD_NOT_ALLOWED, "405: Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return Some(response);
        }

        let started = Instant::now();
        let response = match self.serve(media).await {
            Ok(response) => {
                self.metrics.record_request_duration(started.elapsed());
                response
            }
            Err(e) => self.error_response(&e),
        };
        Some(response)
    }

    /// Serve a parsed media request
    pub async fn serve(&self, request: MediaRequest) -> Result<Response<ResponseBody>> {
        let metadata = self.cache.resolve(request.object_id).await?;

        let expected = metadata.capability_hash(self.hash_length);
        if request.hash != expected {
            warn!(
                "Capability hash mismatch for object {}",
                request.object_id
            );
            return Err(StreamError::Forbidden {
                object_id: request.object_id,
            });
        }

        let (range, partial) = match request.range_header.as_deref() {
            Some(header) => (Some(ByteRange::from_header(header, metadata.size)?), true),
            None => (ByteRange::full(metadata.size), false),
        };

        let streams_body = range.is_some() && !request.head_only;
        if streams_body {
            self.streamer
                .ensure_session(metadata.reference.shard_id)
                .await?;
        }

        let presented = presented_metadata(&metadata, request.display_name.as_deref());
        let (status, headers) = self.builder.build_response_header(
            presented.as_ref().unwrap_or(metadata.as_ref()),
            range,
            partial,
            request.disposition,
        )?;

        let body = match range {
            Some(range) if streams_body => {
                let plan = StreamPlan::compute(range, self.max_chunk_size);
                let stream = self
                    .streamer
                    .stream(metadata.reference.clone(), plan)
                    .map_ok(Frame::data);
                StreamBody::new(stream).boxed_unsync()
            }
            _ => empty_body(),
        };

        info!(
            "Serving object {} ({} bytes) with status {}, range={:?}",
            request.object_id,
            metadata.size,
            status.as_u16(),
            range.map(|r| (r.start, r.end))
        );
        self.metrics.record_request(partial, request.head_only);

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Map an error to its HTTP response
    pub fn error_response(&self, err: &StreamError) -> Response<ResponseBody> {
        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.metrics.record_rejection(status.as_u16());

        if status.is_server_error() {
            warn!("Request failed with {}: {}", status.as_u16(), err);
        } else {
            debug!("Request rejected with {}: {}", status.as_u16(), err);
        }

        if let StreamError::RangeNotSatisfiable { size, .. } = err {
            if let Ok((status, headers)) = self.builder.unsatisfiable_header(*size) {
                let mut response = Response::new(full_body("416: Range Not Satisfiable"));
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                return response;
            }
        }

        let reason = status.canonical_reason().unwrap_or("Error");
        self.plain_response(status, format!("{}: {}", status.as_u16(), reason))
    }

    fn plain_response(&self, status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
        let mut response = Response::new(full_body(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }
}

/// Metadata with the URL display name filled in when the store has none
fn presented_metadata(metadata: &ObjectMetadata, display_name: Option<&str>) -> Option<ObjectMetadata> {
    match display_name {
        Some(name) if metadata.file_name.trim().is_empty() && !name.trim().is_empty() => {
            let mut presented = metadata.clone();
            presented.file_name = name.to_string();
            Some(presented)
        }
        _ => None,
    }
}
