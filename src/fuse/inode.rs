//! Inode table for FUSE
//!
//! The kernel addresses objects by inode number while the driver works on
//! logical paths. Inodes are handed out on first lookup and follow renames.
//! Lookups are counted so that a `forget` bringing the count to zero drops
//! the mapping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root inode number
pub const ROOT_INODE: u64 = 1;

/// Inode table mapping inodes to logical paths and vice versa
#[derive(Debug)]
pub struct InodeTable {
    /// Inode to path mapping
    inode_to_path: HashMap<u64, PathBuf>,

    /// Path to inode mapping
    path_to_inode: HashMap<PathBuf, u64>,

    /// Kernel lookup count per inode
    lookups: HashMap<u64, u64>,

    /// Next inode to hand out
    next_inode: u64,
}

impl InodeTable {
    /// Create a new table holding only the root
    pub fn new() -> Self {
        let mut table = Self {
            inode_to_path: HashMap::new(),
            path_to_inode: HashMap::new(),
            lookups: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };

        table.insert(ROOT_INODE, PathBuf::from("/"));
        table
    }

    fn insert(&mut self, inode: u64, path: PathBuf) {
        self.inode_to_path.insert(inode, path.clone());
        self.path_to_inode.insert(path, inode);
    }

    /// Get path by inode
    pub fn get_path(&self, inode: u64) -> Option<&PathBuf> {
        self.inode_to_path.get(&inode)
    }

    /// Get inode by path
    pub fn get_inode(&self, path: &Path) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    /// Inode of `path`, allocating one if the path is new
    pub fn intern(&mut self, path: PathBuf) -> u64 {
        if let Some(inode) = self.get_inode(&path) {
            return inode;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        self.insert(inode, path);
        inode
    }

    /// Inode of `path` for an entry reply; the kernel now holds one more reference
    pub fn lookup(&mut self, path: PathBuf) -> u64 {
        let inode = self.intern(path);
        *self.lookups.entry(inode).or_insert(0) += 1;
        inode
    }

    /// Drop `nlookup` kernel references, unmapping the inode when none remain.
    ///
    /// The root is never forgotten.
    pub fn forget(&mut self, inode: u64, nlookup: u64) {
        if inode == ROOT_INODE {
            return;
        }
        let Some(count) = self.lookups.get_mut(&inode) else {
            return;
        };
        *count = count.saturating_sub(nlookup);
        if *count == 0 {
            self.lookups.remove(&inode);
            if let Some(path) = self.inode_to_path.remove(&inode) {
                self.path_to_inode.remove(&path);
            }
        }
    }

    /// Remove by path
    pub fn remove_path(&mut self, path: &Path) -> Option<u64> {
        let inode = self.path_to_inode.remove(path)?;
        self.inode_to_path.remove(&inode);
        self.lookups.remove(&inode);
        Some(inode)
    }

    /// Move `from` and everything below it to `to`.
    ///
    /// A previous mapping of `to` is dropped, as the rename replaced it.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        self.remove_path(to);

        let moved: Vec<(PathBuf, u64)> = self
            .path_to_inode
            .iter()
            .filter(|(path, _)| path.starts_with(from))
            .map(|(path, inode)| (path.clone(), *inode))
            .collect();

        for (old, inode) in moved {
            let new = match old.strip_prefix(from) {
                Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                Ok(rest) => to.join(rest),
                Err(_) => continue,
            };
            self.path_to_inode.remove(&old);
            self.insert(inode, new);
        }
    }

    /// Number of mapped inodes, root included
    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inode_to_path.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
