//! Out-of-band consistency check of the stripe trees
//!
//! Fan-out operations stop at the first failing stripe and never roll back,
//! so an interrupted mkdir, rename or unlink leaves the stripes disagreeing.
//! The checker walks the primary stripe and reports:
//!
//! - entries missing from another stripe, or of a different kind there
//! - entries on a secondary stripe with no primary counterpart
//! - regular files whose stripe lengths do not match round-robin ownership
//!   of their total length (sparse writes produce this legitimately)
//! - names that do not carry the stripe suffix
//!
//! The checker never modifies the stripes.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::stripe::{path, FileKind, Layout, StripeSet};

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The entry exists on the primary stripe but not on this one
    MissingCounterpart,
    /// The entry is a different kind of object on this stripe
    KindMismatch,
    /// The entry exists on this stripe but not on the primary
    Orphan,
    /// Stripe lengths differ from the round-robin distribution of the total
    IrregularLayout,
    /// A physical name without the stripe suffix
    StrayEntry,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCounterpart => write!(f, "missing_counterpart"),
            Self::KindMismatch => write!(f, "kind_mismatch"),
            Self::Orphan => write!(f, "orphan"),
            Self::IrregularLayout => write!(f, "irregular_layout"),
            Self::StrayEntry => write!(f, "stray_entry"),
        }
    }
}

/// How bad a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Unusual but readable
    Warning,
    /// The logical tree is broken at this path
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FindingKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::IrregularLayout | Self::StrayEntry => Severity::Warning,
            Self::MissingCounterpart | Self::KindMismatch | Self::Orphan => Severity::Error,
        }
    }
}

/// A single inconsistency
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// Logical path, or the physical name for stray entries
    pub path: PathBuf,
    /// Stripe the finding was made on
    pub stripe: usize,
    pub kind: FindingKind,
    pub severity: Severity,
    pub detail: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} on stripe {}: {}",
            self.path.display(),
            self.severity,
            self.kind,
            self.stripe,
            self.detail
        )
    }
}

/// Result of a check pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
    pub directories: u64,
    pub files: u64,
}

impl CheckReport {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    fn push(&mut self, path: PathBuf, stripe: usize, kind: FindingKind, detail: String) {
        debug!("check: {} {} on stripe {}", path.display(), kind, stripe);
        self.findings.push(Finding {
            path,
            stripe,
            kind,
            severity: kind.severity(),
            detail,
        });
    }
}

/// Walks the stripe trees of one filesystem
pub struct Checker<'a> {
    stripes: &'a StripeSet,
    layout: Layout,
}

impl<'a> Checker<'a> {
    pub fn new(stripes: &'a StripeSet, layout: Layout) -> Self {
        Self { stripes, layout }
    }

    /// Check the whole tree
    pub fn run(&self) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        self.check_directory(Path::new("/"), &mut report)?;
        Ok(report)
    }

    fn check_directory(&self, logical: &Path, report: &mut CheckReport) -> Result<()> {
        report.directories += 1;
        let primary = self.stripes.resolve_stripe(logical, 0);
        let mut children = BTreeSet::new();

        for entry in fs::read_dir(&primary)? {
            let entry = entry?;
            let physical_name = entry.file_name();
            match path::logical_name(&physical_name) {
                Some(name) => {
                    children.insert(name.to_os_string());
                }
                None => report.push(
                    primary.join(&physical_name),
                    0,
                    FindingKind::StrayEntry,
                    "name lacks the .1 suffix".into(),
                ),
            }
        }

        for name in &children {
            self.check_entry(&logical.join(name), report)?;
        }

        self.find_orphans(logical, &children, report)
    }

    fn check_entry(&self, logical: &Path, report: &mut CheckReport) -> Result<()> {
        let physical = self.stripes.resolve(logical);
        let kind = FileKind::from(fs::symlink_metadata(&physical[0])?.file_type());
        let mut lengths = Vec::with_capacity(physical.len());
        let mut complete = true;

        for (index, path) in physical.iter().enumerate() {
            let meta = match fs::symlink_metadata(path) {
                Ok(meta) => meta,
                Err(e) if is_missing(&e) => {
                    report.push(
                        logical.to_path_buf(),
                        index,
                        FindingKind::MissingCounterpart,
                        format!("{} does not exist", path.display()),
                    );
                    complete = false;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let stripe_kind = FileKind::from(meta.file_type());
            if stripe_kind != kind {
                report.push(
                    logical.to_path_buf(),
                    index,
                    FindingKind::KindMismatch,
                    format!("expected {:?}, found {:?}", kind, stripe_kind),
                );
                complete = false;
                continue;
            }
            lengths.push(meta.len());
        }

        match kind {
            FileKind::Directory => {
                // A directory missing on some stripe cannot be walked there;
                // its children are still checked from the primary side.
                self.check_directory(logical, report)?;
            }
            FileKind::RegularFile => {
                report.files += 1;
                if complete {
                    let total = lengths.iter().sum();
                    let expected = self.layout.stripe_lengths(total);
                    if lengths != expected {
                        report.push(
                            logical.to_path_buf(),
                            0,
                            FindingKind::IrregularLayout,
                            format!("lengths {:?}, round-robin {:?}", lengths, expected),
                        );
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Entries on secondary stripes whose primary counterpart is missing
    fn find_orphans(
        &self,
        logical: &Path,
        children: &BTreeSet<OsString>,
        report: &mut CheckReport,
    ) -> Result<()> {
        for index in 1..self.stripes.len() {
            let dir = self.stripes.resolve_stripe(logical, index);
            // a missing or mismatched directory was already reported
            if !dir.is_dir() {
                continue;
            }

            for entry in fs::read_dir(&dir)? {
                let physical_name = entry?.file_name();
                match path::strip_suffix(&physical_name, index) {
                    Some(name) if children.contains(name) => {}
                    Some(name) => report.push(
                        logical.join(name),
                        index,
                        FindingKind::Orphan,
                        format!("{} has no primary counterpart", dir.join(&physical_name).display()),
                    ),
                    None => report.push(
                        dir.join(&physical_name),
                        index,
                        FindingKind::StrayEntry,
                        format!("name lacks the .{} suffix", index + 1),
                    ),
                }
            }
        }
        Ok(())
    }
}

/// Not found, or a path component on this stripe is not a directory
fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn stripes(count: usize) -> (TempDir, StripeSet) {
        let dir = tempdir().unwrap();
        let roots: Vec<PathBuf> = (1..=count)
            .map(|i| {
                let root = dir.path().join(format!("s{}", i));
                fs::create_dir(&root).unwrap();
                root
            })
            .collect();
        (dir, StripeSet::new(roots).unwrap())
    }

    fn write_file(set: &StripeSet, logical: &str, lengths: &[usize]) {
        for (index, path) in set.resolve(Path::new(logical)).iter().enumerate() {
            fs::write(path, vec![0u8; lengths[index]]).unwrap();
        }
    }

    #[test]
    fn test_consistent_tree_is_clean() {
        let (_dir, set) = stripes(2);
        for path in set.resolve(Path::new("/d")) {
            fs::create_dir(path).unwrap();
        }
        write_file(&set, "/d/f", &[6, 4]);
        write_file(&set, "/g", &[4, 4]);

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert_eq!(report.files, 2);
        assert_eq!(report.directories, 2);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_missing_counterpart_and_orphan() {
        let (_dir, set) = stripes(3);
        fs::write(set.resolve_stripe(Path::new("/half"), 0), b"").unwrap();
        fs::write(set.resolve_stripe(Path::new("/half"), 1), b"").unwrap();
        fs::write(set.resolve_stripe(Path::new("/ghost"), 2), b"").unwrap();

        let report = Checker::new(&set, Layout::new(4, 3).unwrap()).run().unwrap();
        assert!(report.has_errors());
        assert_eq!(report.count(FindingKind::MissingCounterpart), 1);
        assert_eq!(report.count(FindingKind::Orphan), 1);

        let orphan = report
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::Orphan)
            .unwrap();
        assert_eq!(orphan.path, PathBuf::from("/ghost"));
        assert_eq!(orphan.stripe, 2);
    }

    #[test]
    fn test_kind_mismatch() {
        let (_dir, set) = stripes(2);
        fs::create_dir(set.resolve_stripe(Path::new("/x"), 0)).unwrap();
        fs::write(set.resolve_stripe(Path::new("/x"), 1), b"").unwrap();

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        assert_eq!(report.count(FindingKind::KindMismatch), 1);
    }

    #[test]
    fn test_children_under_mismatched_directory() {
        let (_dir, set) = stripes(2);
        fs::create_dir(set.resolve_stripe(Path::new("/x"), 0)).unwrap();
        fs::write(set.resolve_stripe(Path::new("/x"), 1), b"").unwrap();
        fs::write(set.resolve_stripe(Path::new("/x/c"), 0), b"").unwrap();

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        assert_eq!(report.count(FindingKind::KindMismatch), 1);
        assert_eq!(report.count(FindingKind::MissingCounterpart), 1);
    }

    #[test]
    fn test_irregular_layout_is_a_warning() {
        let (_dir, set) = stripes(2);
        write_file(&set, "/sparse", &[0, 4]);

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        assert_eq!(report.count(FindingKind::IrregularLayout), 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_stray_entries() {
        let (_dir, set) = stripes(2);
        fs::write(set.roots()[0].join("lost+found"), b"").unwrap();
        fs::write(set.roots()[1].join("notes.1"), b"").unwrap();

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        assert_eq!(report.count(FindingKind::StrayEntry), 2);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_report_serializes() {
        let (_dir, set) = stripes(2);
        fs::write(set.resolve_stripe(Path::new("/a"), 0), b"").unwrap();

        let report = Checker::new(&set, Layout::new(4, 2).unwrap()).run().unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"missing_counterpart\""));
        assert!(json.contains("\"error\""));
    }
}
