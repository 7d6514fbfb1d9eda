//! Logical attributes aggregated from the stripe files

use std::fs::{self, FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::StripedFile;
use crate::config::Identity;
use crate::error::Result;

/// Kind of a logical object
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
    CharDevice,
    BlockDevice,
    NamedPipe,
    Socket,
}

impl From<FileType> for FileKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_char_device() {
            FileKind::CharDevice
        } else if file_type.is_block_device() {
            FileKind::BlockDevice
        } else if file_type.is_fifo() {
            FileKind::NamedPipe
        } else if file_type.is_socket() {
            FileKind::Socket
        } else {
            FileKind::RegularFile
        }
    }
}

/// Metadata of a logical object as presented to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalAttr {
    pub kind: FileKind,
    /// Permission bits (no file type bits)
    pub perm: u16,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

impl LogicalAttr {
    /// Attributes of a single physical object, owned by `identity`
    pub fn from_metadata(meta: &Metadata, identity: Identity) -> Self {
        Self {
            kind: FileKind::from(meta.file_type()),
            perm: (meta.mode() & 0o7777) as u16,
            size: meta.size(),
            blocks: meta.blocks(),
            atime: system_time(meta.atime(), meta.atime_nsec()),
            mtime: system_time(meta.mtime(), meta.mtime_nsec()),
            ctime: system_time(meta.ctime(), meta.ctime_nsec()),
            dev: meta.dev(),
            ino: meta.ino(),
            nlink: meta.nlink() as u32,
            uid: identity.uid,
            gid: identity.gid,
            rdev: meta.rdev() as u32,
            blksize: meta.blksize() as u32,
        }
    }
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

impl StripedFile<'_> {
    /// Attributes of the logical object.
    ///
    /// Everything but the size comes from the primary stripe. A regular
    /// file's size is the sum over all stripes; directories and symlinks
    /// keep the primary stripe's size.
    pub fn attributes(&self, identity: Identity) -> Result<LogicalAttr> {
        let primary = fs::symlink_metadata(&self.paths[0])?;
        let mut attr = LogicalAttr::from_metadata(&primary, identity);

        if attr.kind == FileKind::RegularFile {
            for path in &self.paths[1..] {
                attr.size += fs::symlink_metadata(path)?.len();
            }
        }

        Ok(attr)
    }
}
