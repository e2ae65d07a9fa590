//! Request analysis for media routes
//!
//! Maps a request line onto the object it names, the capability hash it
//! carries and the way the body should be presented. Accepted paths:
//!
//! - `/stream/{object_id}?hash={hash}`
//! - `/download/{object_id}/{display_name}?hash={hash}`
//! - `/{hash}{object_id}`, as the whole path
//! - `/{object_id}` and `/{object_id}/{anything}` with `?hash={hash}`

use crate::error::{Result, StreamError};
use crate::response_builder::Disposition;
use http::{header, HeaderMap, Method};
use percent_encoding::percent_decode_str;
use tracing::debug;

/// A request for object bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub object_id: i64,
    /// Capability hash supplied by the caller, empty when missing
    pub hash: String,
    pub disposition: Disposition,
    /// Name from a `/download/` path
    pub display_name: Option<String>,
    /// Raw `Range` header value
    pub range_header: Option<String>,
    /// HEAD requests get headers only
    pub head_only: bool,
}

/// Parses media routes
#[derive(Debug, Clone)]
pub struct RequestAnalyzer {
    hash_length: usize,
}

impl RequestAnalyzer {
    /// Create an analyzer for capability hashes of `hash_length` characters
    pub fn new(hash_length: usize) -> Self {
        RequestAnalyzer { hash_length }
    }

    /// Whether the method can be served by a media route
    pub fn is_supported_method(method: &Method) -> bool {
        method == Method::GET || method == Method::HEAD
    }

    /// Analyze a request
    ///
    /// # Returns
    /// * `Ok(Some(MediaRequest))` for a media route
    /// * `Ok(None)` when the path is not a media route
    /// * `Err(StreamError::MalformedReference)` when a media route carries an
    ///   object id that is not a number
    pub fn analyze(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Option<MediaRequest>> {
        let segments: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let query_hash = query.and_then(|q| query_param(q, "hash")).unwrap_or_default();

        // The compact form only ever spans the whole path
        let compact = match segments.as_slice() {
            [only] => self.split_compact(only),
            _ => None,
        };

        let (object_id, hash, disposition, display_name) = match (segments.as_slice(), compact) {
            (["stream", id], _) => (parse_id(id)?, query_hash, Disposition::Inline, None),
            (["download", id, name, ..], _) => (
                parse_id(id)?,
                query_hash,
                Disposition::Attachment,
                Some(percent_decode_str(name).decode_utf8_lossy().into_owned()),
            ),
            (_, Some((hash, id))) => (id, hash.to_string(), Disposition::Inline, None),
            ([first, ..], None) => match first.parse::<i64>() {
                Ok(id) => (id, query_hash, Disposition::Inline, None),
                Err(_) => return Ok(None),
            },
            ([], None) => return Ok(None),
        };

        let range_header = headers
            .get(header::RANGE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

        debug!(
            "Media request: object_id={}, disposition={:?}, range={:?}",
            object_id, disposition, range_header
        );

        Ok(Some(MediaRequest {
            object_id,
            hash,
            disposition,
            display_name,
            range_header,
            head_only: method == Method::HEAD,
        }))
    }

    /// Split `{hash}{object_id}` into its parts
    fn split_compact<'a>(&self, segment: &'a str) -> Option<(&'a str, i64)> {
        if segment.len() <= self.hash_length || !segment.is_char_boundary(self.hash_length) {
            return None;
        }
        let (hash, id) = segment.split_at(self.hash_length);
        let hash_ok = hash
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !hash_ok || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        id.parse::<i64>().ok().map(|id| (hash, id))
    }
}

fn parse_id(segment: &str) -> Result<i64> {
    segment
        .parse::<i64>()
        .map_err(|_| StreamError::MalformedReference(format!("invalid object id: {}", segment)))
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
    })
}
