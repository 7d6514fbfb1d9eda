//! StripeFS - Stackable Striping File System
//!
//! Presents the union of N ordinary directories ("stripes") as a single
//! mountable filesystem. Regular file contents are split into fixed-size
//! chunks laid out round-robin across the stripes (RAID-0 style), while the
//! directory tree is mirrored on every stripe.
//!
//! # Layout
//!
//! Every component of a logical path `/a/b` is stored on stripe `i` with a
//! `.{i+1}` suffix, so with stripes `/s1` and `/s2` the logical file lives
//! at `/s1/a.1/b.1` and `/s2/a.2/b.2`. Byte `o` of a file belongs to chunk
//! `o / C`, and chunk `k` is stored on stripe `k mod N` at offset
//! `(k / N) * C` within that stripe's file.
//!
//! # Crate structure
//!
//! - [`stripe`] - path translation, chunk arithmetic and striped I/O
//! - [`driver`] - path-based filesystem operations over the stripes
//! - [`fuse`] - kernel binding via fuser
//! - [`check`] - offline consistency check of the stripe trees
//! - [`config`] - TOML configuration

pub mod check;
pub mod config;
pub mod driver;
pub mod error;
pub mod fuse;
pub mod stripe;

pub use check::{CheckReport, Checker, Finding, FindingKind, Severity};
pub use config::{Config, Identity};
pub use driver::{DirEntry, Driver, FsStats, Operation};
pub use error::{Error, Result};
pub use stripe::{ChunkAddress, FileKind, Layout, LogicalAttr, StripeSet};
