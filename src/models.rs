//! Core data models for the media streaming engine

use crate::error::{Result, StreamError};
use crate::file_id::ObjectReference;
use serde::{Deserialize, Serialize};

/// Represents a byte range for HTTP Range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Arguments
    /// * `start` - Starting byte position (inclusive)
    /// * `end` - Ending byte position (inclusive)
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(StreamError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(StreamError::ParseError(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Range covering a whole object of `size` bytes, `None` for empty objects
    pub fn full(size: u64) -> Option<Self> {
        if size == 0 {
            None
        } else {
            Some(ByteRange {
                start: 0,
                end: size - 1,
            })
        }
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Parse an HTTP Range header value against an object of `size` bytes
    ///
    /// Accepted forms:
    /// - `bytes=<from>-<until>`
    /// - `bytes=<from>-` (until defaults to `size - 1`)
    /// - `bytes=-<n>` (the last `n` bytes)
    ///
    /// Every failure, including a syntactically broken header or a
    /// multi-range request, is reported as
    /// [`StreamError::RangeNotSatisfiable`] so the caller can answer with
    /// `416` and `Content-Range: bytes */<size>`.
    pub fn from_header(header: &str, size: u64) -> Result<Self> {
        let header = header.trim();

        let ranges = header
            .strip_prefix("bytes=")
            .ok_or_else(|| StreamError::unsatisfiable(size, format!(
                "Range header must start with 'bytes=', got: {}",
                header
            )))?;

        if ranges.contains(',') {
            return Err(StreamError::unsatisfiable(
                size,
                "multiple ranges are not supported",
            ));
        }

        let (from, until) = ranges.split_once('-').ok_or_else(|| {
            StreamError::unsatisfiable(size, format!("expected 'from-until', got: {}", ranges))
        })?;
        let (from, until) = (from.trim(), until.trim());

        let parse = |value: &str, what: &str| {
            value.parse::<u64>().map_err(|e| {
                StreamError::unsatisfiable(size, format!("invalid {} value '{}': {}", what, value, e))
            })
        };

        if size == 0 {
            return Err(StreamError::unsatisfiable(size, "object is empty"));
        }

        let (start, end) = if from.is_empty() {
            let suffix = parse(until, "suffix length")?;
            if suffix == 0 {
                return Err(StreamError::unsatisfiable(size, "zero-length suffix range"));
            }
            (size.saturating_sub(suffix), size - 1)
        } else {
            let start = parse(from, "start")?;
            let end = if until.is_empty() {
                size - 1
            } else {
                parse(until, "end")?
            };
            (start, end)
        };

        if start > end || end >= size {
            return Err(StreamError::unsatisfiable(
                size,
                format!("{}-{} is outside 0-{}", start, end, size - 1),
            ));
        }

        Ok(ByteRange { start, end })
    }

    /// Format as a `Content-Range` header value for an object of `total` bytes
    pub fn to_content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Properties of a resolved object, as held by the metadata cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Where the object lives and how to fetch it
    pub reference: ObjectReference,
    /// Stable unique id the capability hash is derived from
    pub unique_id: String,
    /// Total size in bytes
    pub size: u64,
    /// MIME type reported by the store, empty when unknown
    pub mime_type: String,
    /// Original file name, empty when unknown
    pub file_name: String,
}

impl ObjectMetadata {
    /// Create metadata whose unique id is derived from the reference
    pub fn new(
        reference: ObjectReference,
        size: u64,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        let unique_id = reference.unique_id();
        ObjectMetadata {
            reference,
            unique_id,
            size,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Capability hash that URLs for this object must carry
    pub fn capability_hash(&self, length: usize) -> String {
        self.unique_id.chars().take(length).collect()
    }
}
