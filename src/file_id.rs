//! Object reference codec
//!
//! An [`ObjectReference`] locates one stored object: which shard holds it, its
//! id and access secret, the opaque capability token the store hands out, and
//! for thumbnails the descriptor of the thumbnail variant. References travel
//! through URLs and databases as compact strings:
//!
//! ```text
//! base64url( rle( u32 kind|flags, i32 shard, [token], i64 id, i64 secret,
//!                 [thumbnail], u8 sub_version, u8 version ) )
//! ```
//!
//! All integers are little-endian. Runs of zero bytes are compressed as
//! `0x00 <count>`. Decoding never panics: every malformed input is reported as
//! [`StreamError::MalformedReference`].
//!
//! Two secondary identifiers are derived from a reference:
//! - [`ObjectReference::unique_id`]: stable across capability tokens and
//!   shards, the source of the URL capability hash.
//! - [`ObjectReference::dedup_key`]: a fixed `<iiqq` pack used as a database
//!   key, identical for all tokens captured for the same object.

use crate::error::{Result, StreamError};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes};
use std::fmt;
use std::str::FromStr;

/// Encoding format version, stored as the last byte
pub const VERSION: u8 = 4;
/// Encoding sub-version, stored as the second-to-last byte
pub const SUB_VERSION: u8 = 22;

const CAPABILITY_TOKEN_FLAG: u32 = 1 << 25;
const THUMBNAIL_FLAG: u32 = 1 << 26;
const KIND_MASK: u32 = 0x00ff_ffff;

/// Longest capability token the length prefix can describe
const MAX_TOKEN_LEN: usize = 0x00ff_ffff;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Kind of stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Thumbnail,
    ChatPhoto,
    Photo,
    Voice,
    Video,
    Document,
    Sticker,
    Audio,
    Animation,
    VideoNote,
}

impl FileKind {
    /// Numeric id used in the binary layout
    pub fn id(self) -> u32 {
        match self {
            FileKind::Thumbnail => 0,
            FileKind::ChatPhoto => 1,
            FileKind::Photo => 2,
            FileKind::Voice => 3,
            FileKind::Video => 4,
            FileKind::Document => 5,
            FileKind::Sticker => 8,
            FileKind::Audio => 9,
            FileKind::Animation => 10,
            FileKind::VideoNote => 13,
        }
    }

    /// Inverse of [`FileKind::id`]
    pub fn from_id(id: u32) -> Option<Self> {
        let kind = match id {
            0 => FileKind::Thumbnail,
            1 => FileKind::ChatPhoto,
            2 => FileKind::Photo,
            3 => FileKind::Voice,
            4 => FileKind::Video,
            5 => FileKind::Document,
            8 => FileKind::Sticker,
            9 => FileKind::Audio,
            10 => FileKind::Animation,
            13 => FileKind::VideoNote,
            _ => return None,
        };
        Some(kind)
    }

    /// All kinds, in id order
    pub const ALL: [FileKind; 10] = [
        FileKind::Thumbnail,
        FileKind::ChatPhoto,
        FileKind::Photo,
        FileKind::Voice,
        FileKind::Video,
        FileKind::Document,
        FileKind::Sticker,
        FileKind::Audio,
        FileKind::Animation,
        FileKind::VideoNote,
    ];
}

/// Where a thumbnail variant comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbnailSource {
    /// A sized thumbnail of another object; `size_type` is the store's size letter
    Thumbnail { file_kind: FileKind, size_type: u8 },
    ChatPhotoSmall { chat_id: i64, chat_access_hash: i64 },
    ChatPhotoBig { chat_id: i64, chat_access_hash: i64 },
}

impl ThumbnailSource {
    fn tag(&self) -> u32 {
        match self {
            ThumbnailSource::Thumbnail { .. } => 1,
            ThumbnailSource::ChatPhotoSmall { .. } => 2,
            ThumbnailSource::ChatPhotoBig { .. } => 3,
        }
    }
}

/// Descriptor of a thumbnail variant of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailDescriptor {
    pub source: ThumbnailSource,
    pub volume_id: i64,
    pub local_id: i32,
}

/// Decoded, structured form of an opaque object identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub kind: FileKind,
    pub shard_id: i32,
    pub object_id: i64,
    pub access_secret: i64,
    /// Opaque, reusable token; may expire on the store side
    pub capability_token: Bytes,
    pub thumbnail: Option<ThumbnailDescriptor>,
}

impl ObjectReference {
    /// Create a reference without capability token or thumbnail
    pub fn new(kind: FileKind, shard_id: i32, object_id: i64, access_secret: i64) -> Self {
        ObjectReference {
            kind,
            shard_id,
            object_id,
            access_secret,
            capability_token: Bytes::new(),
            thumbnail: None,
        }
    }

    /// Attach a capability token
    pub fn with_capability_token(mut self, token: impl Into<Bytes>) -> Self {
        self.capability_token = token.into();
        self
    }

    /// Attach a thumbnail descriptor
    pub fn with_thumbnail(mut self, thumbnail: ThumbnailDescriptor) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Encode this reference into its compact string form
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(64 + self.capability_token.len());

        let mut header = self.kind.id();
        if !self.capability_token.is_empty() {
            header |= CAPABILITY_TOKEN_FLAG;
        }
        if self.thumbnail.is_some() {
            header |= THUMBNAIL_FLAG;
        }

        buf.put_u32_le(header);
        buf.put_i32_le(self.shard_id);
        if !self.capability_token.is_empty() {
            write_length_prefixed(&mut buf, &self.capability_token);
        }
        buf.put_i64_le(self.object_id);
        buf.put_i64_le(self.access_secret);

        if let Some(thumbnail) = &self.thumbnail {
            buf.put_u32_le(thumbnail.source.tag());
            match thumbnail.source {
                ThumbnailSource::Thumbnail {
                    file_kind,
                    size_type,
                } => {
                    buf.put_u32_le(file_kind.id());
                    buf.put_u8(size_type);
                }
                ThumbnailSource::ChatPhotoSmall {
                    chat_id,
                    chat_access_hash,
                }
                | ThumbnailSource::ChatPhotoBig {
                    chat_id,
                    chat_access_hash,
                } => {
                    buf.put_i64_le(chat_id);
                    buf.put_i64_le(chat_access_hash);
                }
            }
            buf.put_i64_le(thumbnail.volume_id);
            buf.put_i32_le(thumbnail.local_id);
        }

        buf.put_u8(SUB_VERSION);
        buf.put_u8(VERSION);

        URL_SAFE_LENIENT.encode(rle_encode(&buf))
    }

    /// Decode a reference from its compact string form
    ///
    /// # Returns
    /// * `Ok(ObjectReference)` for any string produced by [`ObjectReference::encode`]
    /// * `Err(StreamError::MalformedReference)` for anything else
    pub fn decode(encoded: &str) -> Result<Self> {
        let compressed = URL_SAFE_LENIENT
            .decode(encoded.trim())
            .map_err(|e| malformed(format!("invalid base64: {}", e)))?;
        let raw = rle_decode(&compressed)?;

        if raw.len() < 2 {
            return Err(malformed("missing version trailer"));
        }
        let (body, trailer) = raw.split_at(raw.len() - 2);
        if trailer[1] != VERSION {
            return Err(malformed(format!(
                "unsupported version {}.{}",
                trailer[1], trailer[0]
            )));
        }

        let mut reader = Reader::new(body);
        let header = reader.u32()?;
        let kind = FileKind::from_id(header & KIND_MASK)
            .ok_or_else(|| malformed(format!("unknown kind {}", header & KIND_MASK)))?;
        let shard_id = reader.i32()?;

        let capability_token = if header & CAPABILITY_TOKEN_FLAG != 0 {
            reader.length_prefixed()?
        } else {
            Bytes::new()
        };

        let object_id = reader.i64()?;
        let access_secret = reader.i64()?;

        let thumbnail = if header & THUMBNAIL_FLAG != 0 {
            let source = match reader.u32()? {
                1 => {
                    let kind_id = reader.u32()?;
                    let file_kind = FileKind::from_id(kind_id)
                        .ok_or_else(|| malformed(format!("unknown thumbnail kind {}", kind_id)))?;
                    ThumbnailSource::Thumbnail {
                        file_kind,
                        size_type: reader.u8()?,
                    }
                }
                2 => ThumbnailSource::ChatPhotoSmall {
                    chat_id: reader.i64()?,
                    chat_access_hash: reader.i64()?,
                },
                3 => ThumbnailSource::ChatPhotoBig {
                    chat_id: reader.i64()?,
                    chat_access_hash: reader.i64()?,
                },
                other => return Err(malformed(format!("unknown thumbnail source {}", other))),
            };
            Some(ThumbnailDescriptor {
                source,
                volume_id: reader.i64()?,
                local_id: reader.i32()?,
            })
        } else {
            None
        };

        if reader.remaining() != 0 {
            return Err(malformed(format!(
                "{} trailing bytes after reference",
                reader.remaining()
            )));
        }

        Ok(ObjectReference {
            kind,
            shard_id,
            object_id,
            access_secret,
            capability_token,
            thumbnail,
        })
    }

    /// Stable identifier of the underlying object
    ///
    /// Independent of shard, access secret and capability token. Every kind,
    /// photos included, is keyed by the document class and its object id, the
    /// same way the store derives its own unique ids. Chat photo thumbnails
    /// use the legacy photo class keyed by their volume/local id pair.
    pub fn unique_id(&self) -> String {
        let mut buf = Vec::with_capacity(24);
        match &self.thumbnail {
            Some(ThumbnailDescriptor {
                source: ThumbnailSource::ChatPhotoSmall { .. } | ThumbnailSource::ChatPhotoBig { .. },
                volume_id,
                local_id,
            }) => {
                buf.put_i32_le(UNIQUE_PHOTO);
                buf.put_i64_le(*volume_id);
                buf.put_i32_le(*local_id);
            }
            _ => {
                buf.put_i32_le(UNIQUE_DOCUMENT);
                buf.put_i64_le(self.object_id);
            }
        }
        URL_SAFE_LENIENT.encode(rle_encode(&buf))
    }

    /// Capability hash embedded in URLs: the first `length` characters of the unique id
    pub fn capability_hash(&self, length: usize) -> String {
        let unique_id = self.unique_id();
        // base64url output is ASCII, so byte slicing stays on char boundaries
        unique_id[..length.min(unique_id.len())].to_string()
    }

    /// Database-friendly key that ignores the capability token and thumbnail
    ///
    /// Packs `{kind: i32, shard_id: i32, object_id: i64, access_secret: i64}`
    /// little-endian, appends the version trailer, compresses zero runs and
    /// encodes as unpadded base64url.
    pub fn dedup_key(&self) -> Result<String> {
        let mut packed = bincode::serialize(&(
            self.kind.id() as i32,
            self.shard_id,
            self.object_id,
            self.access_secret,
        ))
        .map_err(|e| StreamError::InternalError(format!("failed to pack dedup key: {}", e)))?;
        packed.push(SUB_VERSION);
        packed.push(VERSION);
        Ok(URL_SAFE_LENIENT.encode(rle_encode(&packed)))
    }
}

const UNIQUE_PHOTO: i32 = 1;
const UNIQUE_DOCUMENT: i32 = 2;

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ObjectReference {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectReference::decode(s)
    }
}

/// Compress runs of zero bytes as `0x00 <run length>`
pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros: u8 = 0;

    for &byte in data {
        if byte == 0 {
            if zeros == u8::MAX {
                out.extend_from_slice(&[0, zeros]);
                zeros = 0;
            }
            zeros += 1;
            continue;
        }
        if zeros > 0 {
            out.extend_from_slice(&[0, zeros]);
            zeros = 0;
        }
        out.push(byte);
    }
    if zeros > 0 {
        out.extend_from_slice(&[0, zeros]);
    }
    out
}

/// Inverse of [`rle_encode`]
pub fn rle_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut iter = data.iter();

    while let Some(&byte) = iter.next() {
        if byte != 0 {
            out.push(byte);
            continue;
        }
        let count = iter
            .next()
            .ok_or_else(|| malformed("truncated zero run"))?;
        out.resize(out.len() + *count as usize, 0);
    }
    Ok(out)
}

fn malformed(reason: impl Into<String>) -> StreamError {
    StreamError::MalformedReference(reason.into())
}

/// Length-prefixed byte string, padded to a multiple of four bytes
fn write_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    let len = data.len().min(MAX_TOKEN_LEN);
    let prefix = if len <= 253 {
        buf.put_u8(len as u8);
        1
    } else {
        buf.put_u8(254);
        buf.put_uint_le(len as u64, 3);
        4
    };
    buf.put_slice(&data[..len]);
    let padding = (4 - (prefix + len) % 4) % 4;
    buf.put_bytes(0, padding);
}

/// Bounds-checked little-endian reader over the decompressed body
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(malformed(format!(
                "truncated reference: need {} more bytes, have {}",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn i64(&mut self) -> Result<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    fn length_prefixed(&mut self) -> Result<Bytes> {
        let first = self.u8()?;
        let (len, prefix) = if first <= 253 {
            (first as usize, 1)
        } else {
            self.need(3)?;
            (self.buf.get_uint_le(3) as usize, 4)
        };
        self.need(len)?;
        let data = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len);

        let padding = (4 - (prefix + len) % 4) % 4;
        self.need(padding)?;
        self.buf.advance(padding);
        Ok(data)
    }
}
