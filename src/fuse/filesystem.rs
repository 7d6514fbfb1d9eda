//! StripeFS FUSE Filesystem Implementation
//!
//! Implements the fuser::Filesystem trait on top of the path-based
//! [`Driver`]. This layer only maps inodes to logical paths and driver
//! results to FUSE replies; all striping happens in the driver.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tracing::{debug, warn};

use super::inode::{InodeTable, ROOT_INODE};
use crate::driver::{Driver, Operation};
use crate::error::Error;
use crate::stripe::{FileKind, LogicalAttr};

/// TTL for attribute caching
const TTL: Duration = Duration::from_secs(1);

/// Handle returned from open/create; nothing is kept per handle
const NO_HANDLE: u64 = 0;

/// StripeFS FUSE Filesystem
pub struct StripeFuse {
    /// Striping driver
    driver: Driver,

    /// Inode to logical path mapping
    inodes: InodeTable,
}

impl StripeFuse {
    /// Create a FUSE filesystem over a driver
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            inodes: InodeTable::new(),
        }
    }

    fn path(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.get_path(ino).cloned()
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.inodes.get_path(parent).map(|p| p.join(name))
    }

    /// Stat a logical path and map it to an inode for an entry reply
    fn entry(&mut self, path: PathBuf) -> Result<FileAttr, Error> {
        let attr = self.driver.get_attributes(&path)?;
        let ino = self.inodes.lookup(path);
        Ok(file_attr(ino, &attr))
    }
}

/// Errno for a failed operation, logged the way the failure deserves
fn errno(op: Operation, path: &Path, err: &Error) -> libc::c_int {
    let code = err.to_errno();
    if code == libc::ENOENT {
        debug!("{} {:?}: not found", op, path);
    } else {
        warn!("{} {:?} failed: {}", op, path, err);
    }
    code
}

/// Map a logical kind to the FUSE file type
pub fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Symlink => FileType::Symlink,
        FileKind::CharDevice => FileType::CharDevice,
        FileKind::BlockDevice => FileType::BlockDevice,
        FileKind::NamedPipe => FileType::NamedPipe,
        FileKind::Socket => FileType::Socket,
    }
}

/// Convert logical attributes to FileAttr under the kernel-facing inode
pub fn file_attr(ino: u64, attr: &LogicalAttr) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn time_or_now(time: Option<TimeOrNow>) -> Option<SystemTime> {
    time.map(|t| match t {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    })
}

impl Filesystem for StripeFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup: parent={}, name={:?}", parent, name);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.entry(path.clone()) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno(Operation::GetAttr, &path, &e)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        debug!("forget: ino={}, nlookup={}", ino, nlookup);
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.get_attributes(&path) {
            Ok(attr) => reply.attr(&TTL, &file_attr(ino, &attr)),
            Err(e) => reply.error(errno(Operation::GetAttr, &path, &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(
            "setattr: ino={}, mode={:?}, uid={:?}, gid={:?}, size={:?}",
            ino, mode, uid, gid, size
        );

        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let mut op = Operation::GetAttr;
        let result = (|| -> Result<LogicalAttr, Error> {
            if let Some(mode) = mode {
                op = Operation::Chmod;
                self.driver.change_mode(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                op = Operation::Chown;
                self.driver.change_owner(&path, uid, gid)?;
            }
            if let Some(size) = size {
                op = Operation::Truncate;
                match fh {
                    Some(fh) => self.driver.truncate_by_handle(&path, fh, size)?,
                    None => self.driver.truncate(&path, size)?,
                }
            }
            if atime.is_some() || mtime.is_some() {
                op = Operation::SetTimes;
                self.driver
                    .set_times(&path, time_or_now(atime), time_or_now(mtime))?;
            }
            match fh {
                Some(fh) => self.driver.get_attributes_by_handle(&path, fh),
                None => self.driver.get_attributes(&path),
            }
        })();

        match result {
            Ok(attr) => reply.attr(&TTL, &file_attr(ino, &attr)),
            Err(e) => reply.error(errno(op, &path, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.driver.read(&path, size as usize, offset) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno(Operation::Read, &path, &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={}, offset={}, size={}", ino, offset, data.len());

        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.driver.write(&path, data, offset) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(errno(Operation::Write, &path, &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        let Some(dir_path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let children = match self.driver.list_directory(&dir_path) {
            Ok(children) => children,
            Err(e) => {
                reply.error(errno(Operation::ReadDir, &dir_path, &e));
                return;
            }
        };

        let parent_ino = match dir_path.parent() {
            Some(parent) => self.inodes.intern(parent.to_path_buf()),
            None => ROOT_INODE,
        };

        let mut entries = vec![
            (ino, FileType::Directory, ".".into()),
            (parent_ino, FileType::Directory, "..".into()),
        ];
        for child in children {
            let child_ino = self.inodes.intern(dir_path.join(&child.name));
            entries.push((child_ino, file_type(child.kind), child.name));
        }

        // Return entries starting from offset
        for (i, (inode, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*inode, (i + 1) as i64, *kind, name) {
                break;
            }
        }

        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir: parent={}, name={:?}, mode={:o}", parent, name, mode);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        let result = self
            .driver
            .make_directory(&path, mode)
            .and_then(|_| self.entry(path.clone()));

        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno(Operation::MkDir, &path, &e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create: parent={}, name={:?}, mode={:o}", parent, name, mode);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        let result = self
            .driver
            .create(&path, mode)
            .and_then(|_| self.entry(path.clone()));

        match result {
            Ok(attr) => reply.created(&TTL, &attr, 0, NO_HANDLE, 0),
            Err(e) => reply.error(errno(Operation::Create, &path, &e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink: parent={}, name={:?}", parent, name);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.unlink(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno(Operation::Unlink, &path, &e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir: parent={}, name={:?}", parent, name);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.remove_directory(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno(Operation::RmDir, &path, &e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename: parent={}, name={:?}, newparent={}, newname={:?}",
            parent, name, newparent, newname
        );

        // RENAME_NOREPLACE / RENAME_EXCHANGE cannot be fanned out faithfully
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let (Some(from), Some(to)) = (
            self.child_path(parent, name),
            self.child_path(newparent, newname),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.rename(&from, &to) {
            Ok(()) => {
                self.inodes.rename(&from, &to);
                reply.ok();
            }
            Err(e) => reply.error(errno(Operation::Rename, &from, &e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}, flags={:#x}", ino, flags);

        let Some(path) = self.path(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.driver.open(&path, flags) {
            Ok(()) => reply.opened(NO_HANDLE, 0),
            Err(e) => reply.error(errno(Operation::Open, &path, &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release: ino={}, fh={}", ino, fh);

        let Some(path) = self.path(ino) else {
            reply.ok();
            return;
        };

        match self.driver.release(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(Operation::Release, &path, &e)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats = self.driver.statistics();
        reply.statfs(
            stats.blocks,
            stats.blocks_free,
            stats.blocks_available,
            stats.files,
            stats.files_free,
            stats.block_size,
            stats.name_max,
            stats.fragment_size,
        );
    }

    fn readlink(&mut self, _req: &Request, _ino: u64, reply: ReplyData) {
        reply.error(self.driver.unsupported(Operation::ReadLink).to_errno());
    }

    fn symlink(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _link: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(self.driver.unsupported(Operation::Symlink).to_errno());
    }

    fn link(
        &mut self,
        _req: &Request,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(self.driver.unsupported(Operation::Link).to_errno());
    }

    fn mknod(
        &mut self,
        _req: &Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.driver.unsupported(Operation::MkNod).to_errno());
    }

    fn access(&mut self, _req: &Request, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        reply.error(self.driver.unsupported(Operation::Access).to_errno());
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.driver.unsupported(Operation::SetXattr).to_errno());
    }

    fn getxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _name: &OsStr,
        _size: u32,
        reply: ReplyXattr,
    ) {
        reply.error(self.driver.unsupported(Operation::GetXattr).to_errno());
    }

    fn listxattr(&mut self, _req: &Request, _ino: u64, _size: u32, reply: ReplyXattr) {
        reply.error(self.driver.unsupported(Operation::ListXattr).to_errno());
    }

    fn removexattr(&mut self, _req: &Request, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.driver.unsupported(Operation::RemoveXattr).to_errno());
    }
}
