//! Logical to physical path translation
//!
//! Every component of a logical path is suffixed with `.{index + 1}` on
//! stripe `index`, at every level:
//!
//! ```text
//! /a/b/c  ->  <stripe0>/a.1/b.1/c.1
//!             <stripe1>/a.2/b.2/c.2
//! ```
//!
//! This naming is the persisted layout; changing it orphans existing data.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Physical name of `name` on stripe `index`
pub fn suffixed(name: &OsStr, index: usize) -> OsString {
    let mut physical = name.to_os_string();
    physical.push(format!(".{}", index + 1));
    physical
}

/// Strip the suffix of stripe `index` from a physical name.
///
/// Returns `None` when the name does not carry that suffix or when nothing
/// would be left of it.
pub fn strip_suffix(physical: &OsStr, index: usize) -> Option<&OsStr> {
    let suffix = format!(".{}", index + 1);
    let name = physical.as_bytes().strip_suffix(suffix.as_bytes())?;
    if name.is_empty() {
        return None;
    }
    Some(OsStr::from_bytes(name))
}

/// Logical name of an entry found on the primary stripe
pub fn logical_name(physical: &OsStr) -> Option<&OsStr> {
    strip_suffix(physical, 0)
}

/// Physical path of `logical` on the stripe rooted at `root`.
///
/// `..` is resolved lexically and never climbs above the stripe root; `.`
/// is ignored. The kernel only ever sends normalized paths.
pub fn resolve_one(root: &Path, logical: &Path, index: usize) -> PathBuf {
    let mut physical = root.to_path_buf();
    let mut depth = 0usize;
    for component in logical.components() {
        match component {
            Component::Normal(name) => {
                physical.push(suffixed(name, index));
                depth += 1;
            }
            Component::ParentDir if depth > 0 => {
                physical.pop();
                depth -= 1;
            }
            _ => {}
        }
    }
    physical
}

/// Physical paths of `logical` on every stripe, in stripe order.
///
/// The root path maps to the stripe roots themselves.
pub fn resolve(roots: &[PathBuf], logical: &Path) -> Vec<PathBuf> {
    roots
        .iter()
        .enumerate()
        .map(|(index, root)| resolve_one(root, logical, index))
        .collect()
}
