//! Striping engine: path fan-out, chunk placement and per-stripe I/O

pub mod attr;
pub mod chunk;
pub mod io;
pub mod lock;
pub mod path;
pub mod truncate;

use std::path::{Path, PathBuf};

pub use attr::{FileKind, LogicalAttr};
pub use chunk::{ChunkAddress, Layout};
pub use lock::StripeLocks;
pub use truncate::stripe_lengths;

use crate::config::MIN_STRIPES;
use crate::error::{Error, Result};

/// Ordered stripe roots. Index `i` owns every chunk `k` with `k % N == i`.
#[derive(Debug, Clone)]
pub struct StripeSet {
    roots: Vec<PathBuf>,
}

impl StripeSet {
    /// Create a stripe set; every root must be an existing directory
    pub fn new(roots: Vec<PathBuf>) -> Result<Self> {
        if roots.len() < MIN_STRIPES {
            return Err(Error::Config(format!(
                "number of stripes must be at least {}, got {}",
                MIN_STRIPES,
                roots.len()
            )));
        }
        for root in &roots {
            if !root.is_dir() {
                return Err(Error::Config(format!(
                    "stripe target {} is not a directory",
                    root.display()
                )));
            }
        }
        Ok(Self { roots })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Physical paths of a logical path on every stripe
    pub fn resolve(&self, logical: &Path) -> Vec<PathBuf> {
        path::resolve(&self.roots, logical)
    }

    /// Physical path of a logical path on a single stripe
    pub fn resolve_stripe(&self, logical: &Path, index: usize) -> PathBuf {
        path::resolve_one(&self.roots[index], logical, index)
    }
}

/// The N physical files backing one logical file
pub struct StripedFile<'a> {
    paths: Vec<PathBuf>,
    layout: Layout,
    locks: &'a StripeLocks,
}

impl<'a> StripedFile<'a> {
    pub fn new(paths: Vec<PathBuf>, layout: Layout, locks: &'a StripeLocks) -> Self {
        debug_assert_eq!(paths.len(), layout.stripe_count());
        Self {
            paths,
            layout,
            locks,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}
