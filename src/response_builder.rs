//! Response header construction for streamed objects

use crate::error::{Result, StreamError};
use crate::models::{ByteRange, ObjectMetadata};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::Rng;
use tracing::debug;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// How the client should present the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Render in place (`/stream/` routes)
    Inline,
    /// Save to disk (`/download/` routes)
    Attachment,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// MIME type and file name as they will be sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub mime_type: String,
    pub file_name: String,
}

impl Presentation {
    /// Fill in a missing MIME type or file name
    ///
    /// - MIME type missing: guessed from the file name, else
    ///   `application/octet-stream`
    /// - file name missing: a random 4-hex-digit stem with the MIME subtype as
    ///   extension, or `.unknown` when the MIME type was missing too
    pub fn for_object(metadata: &ObjectMetadata) -> Self {
        let file_name = metadata.file_name.trim();
        let mime_type = metadata.mime_type.trim();

        let resolved_mime = if !mime_type.is_empty() {
            mime_type.to_string()
        } else if !file_name.is_empty() {
            mime_guess::from_path(file_name)
                .first_raw()
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string()
        } else {
            DEFAULT_MIME_TYPE.to_string()
        };

        let resolved_name = if !file_name.is_empty() {
            file_name.to_string()
        } else {
            let extension = if mime_type.is_empty() {
                "unknown"
            } else {
                mime_type
                    .split('/')
                    .nth(1)
                    .filter(|subtype| !subtype.is_empty())
                    .unwrap_or("unknown")
            };
            format!("{}.{}", random_stem(), extension)
        };

        Presentation {
            mime_type: resolved_mime,
            file_name: resolved_name,
        }
    }

    /// `Content-Disposition` value carrying the file name
    ///
    /// Non-ASCII names are sent as an RFC 5987 `filename*` parameter with an
    /// ASCII `filename` fallback.
    pub fn content_disposition(&self, disposition: Disposition) -> String {
        let ascii: String = self
            .file_name
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii_graphic() || c == ' ' => c,
                _ => '_',
            })
            .collect();

        if ascii == self.file_name {
            format!("{}; filename=\"{}\"", disposition.as_str(), ascii)
        } else {
            format!(
                "{}; filename=\"{}\"; filename*=UTF-8''{}",
                disposition.as_str(),
                ascii,
                utf8_percent_encode(&self.file_name, NON_ALPHANUMERIC)
            )
        }
    }
}

fn random_stem() -> String {
    format!("{:04x}", rand::thread_rng().gen::<u16>())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StreamError::InternalError(format!("Invalid header value: {}", e)))
}

/// Builds status lines and headers for media responses
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn new() -> Self {
        ResponseBuilder
    }

    /// Build response headers for a streamed object
    ///
    /// # Arguments
    /// * `metadata` - Resolved object metadata
    /// * `range` - Served byte range, `None` for an empty object
    /// * `partial` - Whether the client sent a `Range` header
    /// * `disposition` - Inline or attachment
    ///
    /// # Returns
    /// `206` with `Content-Range` when `partial`, otherwise `200` with the
    /// full length.
    pub fn build_response_header(
        &self,
        metadata: &ObjectMetadata,
        range: Option<ByteRange>,
        partial: bool,
        disposition: Disposition,
    ) -> Result<(StatusCode, HeaderMap)> {
        let presentation = Presentation::for_object(metadata);
        let mut headers = HeaderMap::new();

        let content_length = range.map(|r| r.size()).unwrap_or(0);
        headers.insert(
            header::CONTENT_LENGTH,
            header_value(&content_length.to_string())?,
        );

        let status = match range {
            Some(range) if partial => {
                headers.insert(
                    header::CONTENT_RANGE,
                    header_value(&range.to_content_range(metadata.size))?,
                );
                StatusCode::PARTIAL_CONTENT
            }
            _ => StatusCode::OK,
        };

        headers.insert(header::CONTENT_TYPE, header_value(&presentation.mime_type)?);
        headers.insert(
            header::CONTENT_DISPOSITION,
            header_value(&presentation.content_disposition(disposition))?,
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        debug!(
            "Built response headers: status={}, content_length={}, type={}",
            status, content_length, presentation.mime_type
        );

        Ok((status, headers))
    }

    /// Headers for a `416 Range Not Satisfiable` answer
    pub fn unsatisfiable_header(&self, size: u64) -> Result<(StatusCode, HeaderMap)> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_RANGE,
            header_value(&format!("bytes */{}", size))?,
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_id::{FileKind, ObjectReference};

    fn metadata(mime: &str, name: &str) -> ObjectMetadata {
        ObjectMetadata::new(
            ObjectReference::new(FileKind::Video, 2, 1, 1),
            1000,
            mime,
            name,
        )
    }

    #[test]
    fn test_partial_response_headers() {
        let builder = ResponseBuilder::new();
        let range = ByteRange::new(0, 0).unwrap();
        let (status, headers) = builder
            .build_response_header(&metadata("video/mp4", "a.mp4"), Some(range), true, Disposition::Inline)
            .unwrap();

        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers.get("content-length").unwrap(), "1");
        assert_eq!(headers.get("content-range").unwrap(), "bytes 0-0/1000");
        assert_eq!(headers.get("accept-ranges").unwrap(), "bytes");
        assert_eq!(headers.get("content-type").unwrap(), "video/mp4");
        assert_eq!(
            headers.get("content-disposition").unwrap(),
            "inline; filename=\"a.mp4\""
        );
    }

    #[test]
    fn test_full_response_headers() {
        let builder = ResponseBuilder::new();
        let (status, headers) = builder
            .build_response_header(
                &metadata("video/mp4", "a.mp4"),
                ByteRange::full(1000),
                false,
                Disposition::Attachment,
            )
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("content-length").unwrap(), "1000");
        assert!(headers.get("content-range").is_none());
        assert!(headers
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("attachment;"));
    }

    #[test]
    fn test_empty_object_headers() {
        let mut empty = metadata("text/plain", "e.txt");
        empty.size = 0;
        let (status, headers) = ResponseBuilder::new()
            .build_response_header(&empty, None, false, Disposition::Inline)
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("content-length").unwrap(), "0");
    }

    #[test]
    fn test_unsatisfiable_header() {
        let (status, headers) = ResponseBuilder::new().unsatisfiable_header(1000).unwrap();
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers.get("content-range").unwrap(), "bytes */1000");
    }

    #[test]
    fn test_mime_guessed_from_name() {
        let presentation = Presentation::for_object(&metadata("", "clip.mp4"));
        assert_eq!(presentation.mime_type, "video/mp4");
        assert_eq!(presentation.file_name, "clip.mp4");
    }

    #[test]
    fn test_name_from_mime_subtype() {
        let presentation = Presentation::for_object(&metadata("audio/ogg", ""));
        assert_eq!(presentation.mime_type, "audio/ogg");
        assert!(presentation.file_name.ends_with(".ogg"));
        assert_eq!(presentation.file_name.len(), "0000.ogg".len());
    }

    #[test]
    fn test_nothing_known() {
        let presentation = Presentation::for_object(&metadata("", ""));
        assert_eq!(presentation.mime_type, "application/octet-stream");
        assert!(presentation.file_name.ends_with(".unknown"));
    }

    #[test]
    fn test_non_ascii_file_name() {
        let presentation = Presentation {
            mime_type: "video/mp4".to_string(),
            file_name: "видео \"1\".mp4".to_string(),
        };
        let value = presentation.content_disposition(Disposition::Attachment);
        assert!(value.starts_with("attachment; filename=\""));
        assert!(value.contains("filename*=UTF-8''"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
