//! Per-stripe lengths for a logical file length

use std::fs::OpenOptions;

use super::{Layout, StripedFile};
use crate::error::Result;

/// Physical length of every stripe file for a logical length of `target`.
///
/// Completed round-robin cycles contribute one chunk to every stripe. The
/// remainder is dealt out in stripe order, a chunk at a time, so exactly one
/// stripe may end on a partial chunk and the stripes after it get nothing
/// beyond the baseline.
pub fn stripe_lengths(target: u64, chunk_size: u64, stripe_count: usize) -> Vec<u64> {
    // a cycle larger than u64 is never completed by any target
    let (baseline, mut remaining) = match chunk_size.checked_mul(stripe_count as u64) {
        Some(cycle) => ((target / cycle) * chunk_size, target % cycle),
        None => (0, target),
    };

    (0..stripe_count)
        .map(|_| {
            let extra = remaining.min(chunk_size);
            remaining -= extra;
            baseline + extra
        })
        .collect()
}

impl Layout {
    /// Per-stripe lengths for a logical length
    pub fn stripe_lengths(&self, target: u64) -> Vec<u64> {
        stripe_lengths(target, self.chunk_size(), self.stripe_count())
    }
}

impl StripedFile<'_> {
    /// Set the logical length to `target` by resizing every stripe file
    pub fn truncate(&self, target: u64) -> Result<()> {
        let lengths = self.layout.stripe_lengths(target);

        for (path, length) in self.paths.iter().zip(lengths) {
            let _guard = self.locks.lock(path);
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(length)?;
        }

        Ok(())
    }
}
