//! Chunk address translation
//!
//! Logical chunk `k` lives entirely on stripe `k % N`, as that stripe's
//! `k / N`-th chunk. Read, write and truncate all place bytes through
//! [`Layout`], so they cannot disagree about where a byte lives.

use crate::config::MIN_STRIPES;
use crate::error::{Error, Result};

/// Location of a logical offset on the stripes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAddress {
    /// Stripe holding the chunk
    pub stripe_index: usize,

    /// Offset within that stripe's physical file
    pub physical_offset: u64,

    /// Bytes left in the chunk from this offset on
    pub bytes_available: u64,
}

/// Chunk size and stripe count of a mounted filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    chunk_size: u64,
    stripe_count: usize,
}

impl Layout {
    /// Create a layout, rejecting a zero chunk size, fewer than two stripes,
    /// or a cycle (`chunk_size * stripe_count`) that does not fit in a u64
    pub fn new(chunk_size: u64, stripe_count: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be positive".into()));
        }
        if stripe_count < MIN_STRIPES {
            return Err(Error::InvalidArgument(format!(
                "stripe count must be at least {}, got {}",
                MIN_STRIPES, stripe_count
            )));
        }
        if chunk_size.checked_mul(stripe_count as u64).is_none() {
            return Err(Error::InvalidArgument(format!(
                "chunk size {} times {} stripes overflows a file offset",
                chunk_size, stripe_count
            )));
        }
        Ok(Self {
            chunk_size,
            stripe_count,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn stripe_count(&self) -> usize {
        self.stripe_count
    }

    /// Bytes covered by one chunk on every stripe
    pub fn cycle(&self) -> u64 {
        self.chunk_size * self.stripe_count as u64
    }

    /// Translate a logical offset
    pub fn translate(&self, offset: u64) -> ChunkAddress {
        translate(offset, self.chunk_size, self.stripe_count)
    }
}

/// Translate a logical offset for the given chunk size and stripe count.
///
/// `chunk_size` and `stripe_count` must be non-zero.
pub fn translate(offset: u64, chunk_size: u64, stripe_count: usize) -> ChunkAddress {
    let stripes = stripe_count as u64;
    let chunk_index = offset / chunk_size;
    let chunk_within_stripe = chunk_index / stripes;
    let offset_within_chunk = offset % chunk_size;

    ChunkAddress {
        stripe_index: (chunk_index % stripes) as usize,
        physical_offset: chunk_within_stripe * chunk_size + offset_within_chunk,
        bytes_available: chunk_size - offset_within_chunk,
    }
}
