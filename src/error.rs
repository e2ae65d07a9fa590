//! Error types for the media streaming engine

use thiserror::Error;

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error types that can occur while resolving and streaming objects
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Malformed object reference: {0}")]
    MalformedReference(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Capability hash mismatch for object {object_id}")]
    Forbidden { object_id: i64 },

    #[error("Range not satisfiable for object of {size} bytes: {reason}")]
    RangeNotSatisfiable { size: u64, reason: String },

    #[error("Authorization bytes rejected by shard {shard_id}")]
    AuthBytesInvalid { shard_id: i32 },

    #[error("Authorization for shard {shard_id} failed after {attempts} attempts")]
    AuthFailed { shard_id: i32, attempts: usize },

    #[error("Session for shard {shard_id} is no longer authorized")]
    SessionInvalid { shard_id: i32 },

    #[error("Transient upstream error: {0}")]
    UpstreamTransient(String),

    #[error("Chunk at offset {offset} failed after {attempts} attempts")]
    ChunkFailed { offset: u64, attempts: usize },

    #[error("Upstream rejected request: {status} - {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Network timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(err.to_string())
    }
}

impl StreamError {
    /// Determine if a chunk or resolver call failing with this error should be retried
    ///
    /// Only conditions that leave the shard session intact and may clear up on
    /// their own are retryable. Authentication problems are handled by the
    /// session manager, and client-side errors never succeed on retry.
    pub fn should_retry(&self) -> bool {
        match self {
            StreamError::UpstreamTransient(_) => true,
            StreamError::Timeout(_) => true,
            StreamError::IoError(_) => true,
            StreamError::HttpError(_) => true,

            StreamError::ConfigError(_) => false,
            StreamError::MalformedReference(_) => false,
            StreamError::NotFound(_) => false,
            StreamError::Forbidden { .. } => false,
            StreamError::RangeNotSatisfiable { .. } => false,
            StreamError::AuthBytesInvalid { .. } => false,
            StreamError::AuthFailed { .. } => false,
            StreamError::SessionInvalid { .. } => false,
            StreamError::ChunkFailed { .. } => false, // Already exhausted retries
            StreamError::UpstreamRejected { .. } => false,
            StreamError::ParseError(_) => false,
            StreamError::InternalError(_) => false,
        }
    }

    /// Whether the shard session that produced this error must be discarded
    pub fn invalidates_session(&self) -> bool {
        matches!(self, StreamError::SessionInvalid { .. })
    }

    /// Convert error to HTTP status code
    ///
    /// - Bad identifiers and unparseable input: 400
    /// - Capability hash mismatch: 403
    /// - Unknown objects: 404
    /// - Invalid ranges: 416
    /// - Shard authorization exhausted: 503
    /// - Upstream failures: 502, timeouts 504
    /// - Everything else: 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            StreamError::MalformedReference(_) => 400,
            StreamError::ParseError(_) => 400,
            StreamError::Forbidden { .. } => 403,
            StreamError::NotFound(_) => 404,
            StreamError::RangeNotSatisfiable { .. } => 416,

            StreamError::AuthFailed { .. } => 503,
            StreamError::AuthBytesInvalid { .. } => 503,
            StreamError::SessionInvalid { .. } => 503,

            StreamError::UpstreamTransient(_) => 502,
            StreamError::ChunkFailed { .. } => 502,
            StreamError::UpstreamRejected { .. } => 502,
            StreamError::HttpError(_) => 502,
            StreamError::Timeout(_) => 504,

            StreamError::ConfigError(_) => 500,
            StreamError::IoError(_) => 500,
            StreamError::InternalError(_) => 500,
        }
    }

    /// Create a RangeNotSatisfiable error for an object of the given size
    pub fn unsatisfiable(size: u64, reason: impl Into<String>) -> Self {
        StreamError::RangeNotSatisfiable {
            size,
            reason: reason.into(),
        }
    }

    /// Create an error from an upstream HTTP status code
    ///
    /// 404 maps to NotFound, other 4xx to UpstreamRejected and 5xx to
    /// UpstreamTransient.
    pub fn from_upstream_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 404 {
            StreamError::NotFound(message)
        } else if (400..500).contains(&status) {
            StreamError::UpstreamRejected { status, message }
        } else if (500..600).contains(&status) {
            StreamError::UpstreamTransient(format!("HTTP {}: {}", status, message))
        } else {
            StreamError::HttpError(format!("HTTP {}: {}", status, message))
        }
    }
}
