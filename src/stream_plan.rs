//! Stream Plan
//!
//! Translates a validated byte range into the sequence of fixed-size chunk
//! fetches that cover it, and the cut points used to trim the first and last
//! chunk to the exact requested boundary.

use crate::models::ByteRange;
use bytes::Bytes;
use tracing::debug;

/// Smallest chunk size tier (256 KiB)
pub const SMALL_CHUNK_SIZE: u64 = 256 * 1024;
/// Middle chunk size tier (512 KiB)
pub const MEDIUM_CHUNK_SIZE: u64 = 512 * 1024;
/// Largest chunk size tier and the upper bound accepted by the store (1 MiB)
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;
/// Smallest chunk size the store accepts (4 KiB)
pub const MIN_CHUNK_SIZE: u64 = 4 * 1024;

/// Pick the chunk size for a request of `length` bytes
///
/// Step function over the requested length, never decreasing as the length
/// grows, and never above `max_chunk_size`.
pub fn chunk_size_for(length: u64, max_chunk_size: u64) -> u64 {
    let tier = if length <= SMALL_CHUNK_SIZE / 2 {
        SMALL_CHUNK_SIZE
    } else if length <= MEDIUM_CHUNK_SIZE * 3 / 4 {
        MEDIUM_CHUNK_SIZE
    } else {
        MAX_CHUNK_SIZE
    };
    tier.min(max_chunk_size)
}

/// Per-request streaming parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    /// First requested byte (inclusive)
    pub from_byte: u64,
    /// Last requested byte (inclusive)
    pub until_byte: u64,
    /// Bytes requested per chunk RPC
    pub chunk_size: u64,
    /// Offset of the first chunk, aligned to `chunk_size`
    pub offset: u64,
    /// Bytes to drop from the front of the first chunk
    pub first_part_cut: u64,
    /// Bytes to keep from the front of the last chunk
    pub last_part_cut: u64,
    /// Number of chunk RPCs covering the range
    pub part_count: u64,
}

impl StreamPlan {
    /// Plan the chunk fetches for `range`
    pub fn compute(range: ByteRange, max_chunk_size: u64) -> Self {
        let chunk_size = chunk_size_for(range.size(), max_chunk_size);
        Self::with_chunk_size(range, chunk_size)
    }

    /// Plan the chunk fetches for `range` with a fixed chunk size
    pub fn with_chunk_size(range: ByteRange, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let from_byte = range.start;
        let until_byte = range.end;

        let offset = from_byte - (from_byte % chunk_size);
        let first_part_cut = from_byte - offset;
        let last_part_cut = (until_byte % chunk_size) + 1;
        let part_count = until_byte / chunk_size - offset / chunk_size + 1;

        debug!(
            "Planned range {}-{}: chunk_size={}, offset={}, first_cut={}, last_cut={}, parts={}",
            from_byte, until_byte, chunk_size, offset, first_part_cut, last_part_cut, part_count
        );

        StreamPlan {
            from_byte,
            until_byte,
            chunk_size,
            offset,
            first_part_cut,
            last_part_cut,
            part_count,
        }
    }

    /// Number of bytes the plan yields in total
    pub fn content_length(&self) -> u64 {
        self.until_byte - self.from_byte + 1
    }

    /// Offset of the chunk with the given zero-based index
    pub fn chunk_offset(&self, index: u64) -> u64 {
        self.offset + index * self.chunk_size
    }

    /// Trim the chunk with the given zero-based index to the requested window
    ///
    /// A chunk shorter than `chunk_size` (end of object) is trimmed as far as
    /// it reaches.
    pub fn slice_chunk(&self, index: u64, chunk: &Bytes) -> Bytes {
        let len = chunk.len() as u64;
        let start = if index == 0 { self.first_part_cut } else { 0 };
        let end = if index + 1 == self.part_count {
            self.last_part_cut
        } else {
            len
        };
        let start = start.min(len) as usize;
        let end = end.min(len).max(start as u64) as usize;
        chunk.slice(start..end)
    }
}
