//! StripeFS driver
//!
//! Path-based operation surface over the striping engine. The driver keeps
//! only the stripe set, chunk layout, root metadata and reported identity;
//! every call re-resolves physical paths and re-opens physical files.
//!
//! Fan-out operations apply to stripes in index order and stop at the first
//! failure. Stripes already visited keep the change: there is no rollback,
//! and the divergence is left for [`crate::check`] to report.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::TimeSpec;
use tracing::{debug, info, warn};

use crate::config::{Config, Identity};
use crate::error::{Error, Result};
use crate::stripe::{path, FileKind, Layout, LogicalAttr, StripeLocks, StripeSet, StripedFile};

/// Every filesystem operation the transport can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAttr,
    GetAttrByHandle,
    ReadDir,
    MkDir,
    RmDir,
    Chmod,
    Chown,
    Rename,
    Open,
    Create,
    Write,
    Read,
    Release,
    Unlink,
    SetTimes,
    Truncate,
    TruncateByHandle,
    StatFs,
    Link,
    Symlink,
    ReadLink,
    MkNod,
    Access,
    GetXattr,
    SetXattr,
    ListXattr,
    RemoveXattr,
}

impl Operation {
    /// Whether the driver implements this operation
    pub fn is_supported(&self) -> bool {
        !matches!(
            self,
            Operation::Link
                | Operation::Symlink
                | Operation::ReadLink
                | Operation::MkNod
                | Operation::Access
                | Operation::GetXattr
                | Operation::SetXattr
                | Operation::ListXattr
                | Operation::RemoveXattr
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetAttr => "getattr",
            Operation::GetAttrByHandle => "fgetattr",
            Operation::ReadDir => "readdir",
            Operation::MkDir => "mkdir",
            Operation::RmDir => "rmdir",
            Operation::Chmod => "chmod",
            Operation::Chown => "chown",
            Operation::Rename => "rename",
            Operation::Open => "open",
            Operation::Create => "create",
            Operation::Write => "write",
            Operation::Read => "read",
            Operation::Release => "release",
            Operation::Unlink => "unlink",
            Operation::SetTimes => "utimens",
            Operation::Truncate => "truncate",
            Operation::TruncateByHandle => "ftruncate",
            Operation::StatFs => "statfs",
            Operation::Link => "link",
            Operation::Symlink => "symlink",
            Operation::ReadLink => "readlink",
            Operation::MkNod => "mknod",
            Operation::Access => "access",
            Operation::GetXattr => "getxattr",
            Operation::SetXattr => "setxattr",
            Operation::ListXattr => "listxattr",
            Operation::RemoveXattr => "removexattr",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A child of a logical directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

/// Filesystem statistics reported to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u32,
    pub fragment_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}

/// Fixed statistics; not derived from stripe capacity yet.
const PLACEHOLDER_STATS: FsStats = FsStats {
    block_size: 1024,
    fragment_size: 1024,
    blocks: 1_000_000,
    blocks_free: 500_000,
    blocks_available: 990_000,
    files: 10_000,
    files_free: 9_900,
    name_max: 10_000,
};

/// Striping filesystem driver
pub struct Driver {
    stripes: StripeSet,
    layout: Layout,
    root: PathBuf,
    root_attr: LogicalAttr,
    identity: Identity,
    locks: StripeLocks,
}

impl Driver {
    /// Validate the mount configuration and build a driver
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let stripes = StripeSet::new(config.stripe.roots.clone())?;
        let layout = Layout::new(config.stripe.chunk_size, stripes.len())?;
        let identity = config.identity();
        let root = config.mount.path.clone();
        let root_attr = LogicalAttr::from_metadata(&fs::symlink_metadata(&root)?, identity);

        info!(
            "StripeFS over {} stripes, chunk size {} bytes",
            stripes.len(),
            layout.chunk_size()
        );
        for (index, stripe) in stripes.roots().iter().enumerate() {
            debug!("  stripe {}: {}", index, stripe.display());
        }

        Ok(Self {
            stripes,
            layout,
            root,
            root_attr,
            identity,
            locks: StripeLocks::new(),
        })
    }

    pub fn stripes(&self) -> &StripeSet {
        &self.stripes
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Mount point the driver was built for
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical paths of a logical path
    pub fn resolve(&self, logical: &Path) -> Vec<PathBuf> {
        self.stripes.resolve(logical)
    }

    fn striped(&self, logical: &Path) -> StripedFile<'_> {
        StripedFile::new(self.resolve(logical), self.layout, &self.locks)
    }

    /// Apply `action` to every physical path of `logical`, stopping at the first error
    fn fan_out<F>(&self, op: Operation, logical: &Path, action: F) -> Result<()>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let physical = self.resolve(logical);
        apply_in_order(op, logical, physical.iter().map(PathBuf::as_path), action)
    }

    pub fn get_attributes(&self, logical: &Path) -> Result<LogicalAttr> {
        if is_root(logical) {
            return Ok(self.root_attr.clone());
        }
        self.striped(logical).attributes(self.identity)
    }

    /// Handles are not cached; this is [`Driver::get_attributes`]
    pub fn get_attributes_by_handle(&self, logical: &Path, _fh: u64) -> Result<LogicalAttr> {
        self.get_attributes(logical)
    }

    /// Children of a logical directory, sorted by name.
    ///
    /// Only the primary stripe is listed. Entries without the primary
    /// suffix are not part of the logical tree and are skipped.
    pub fn list_directory(&self, logical: &Path) -> Result<Vec<DirEntry>> {
        let primary = self.stripes.resolve_stripe(logical, 0);
        let mut entries = Vec::new();

        for entry in fs::read_dir(&primary)? {
            let entry = entry?;
            let physical_name = entry.file_name();
            match path::logical_name(&physical_name) {
                Some(name) => entries.push(DirEntry {
                    name: name.to_os_string(),
                    kind: FileKind::from(entry.file_type()?),
                }),
                None => debug!("readdir: skipping stray entry {:?} in {:?}", physical_name, primary),
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn make_directory(&self, logical: &Path, mode: u32) -> Result<()> {
        let mut builder = DirBuilder::new();
        builder.mode(mode & 0o7777);
        self.fan_out(Operation::MkDir, logical, |physical| builder.create(physical))
    }

    pub fn remove_directory(&self, logical: &Path) -> Result<()> {
        self.fan_out(Operation::RmDir, logical, |physical| fs::remove_dir(physical))
    }

    pub fn change_mode(&self, logical: &Path, mode: u32) -> Result<()> {
        let permissions = Permissions::from_mode(mode & 0o7777);
        self.fan_out(Operation::Chmod, logical, |physical| {
            fs::set_permissions(physical, permissions.clone())
        })
    }

    pub fn change_owner(&self, logical: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        self.fan_out(Operation::Chown, logical, |physical| {
            std::os::unix::fs::chown(physical, uid, gid)
        })
    }

    /// Rename stripe `i`'s source to stripe `i`'s destination, for every `i`
    pub fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let sources = self.resolve(from);
        let destinations = self.resolve(to);
        apply_in_order(
            Operation::Rename,
            from,
            sources.iter().zip(&destinations),
            |(source, destination): (&PathBuf, &PathBuf)| fs::rename(source, destination),
        )
    }

    /// Check every stripe file opens with `flags`, then close it.
    ///
    /// `O_TRUNC` is honoured and empties every stripe.
    pub fn open(&self, logical: &Path, flags: i32) -> Result<()> {
        let mut options = OpenOptions::new();
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => {
                options.write(true);
            }
            libc::O_RDWR => {
                options.read(true).write(true);
            }
            _ => {
                options.read(true);
            }
        }
        if flags & libc::O_TRUNC != 0 {
            options.write(true).truncate(true);
        }

        self.fan_out(Operation::Open, logical, |physical| {
            options.open(physical).map(drop)
        })
    }

    /// Create every stripe file if absent and give it `mode`
    pub fn create(&self, logical: &Path, mode: u32) -> Result<()> {
        let mode = mode & 0o7777;
        self.fan_out(Operation::Create, logical, |physical| {
            let file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .mode(mode)
                .open(physical)?;
            file.set_permissions(Permissions::from_mode(mode))
        })
    }

    pub fn write(&self, logical: &Path, data: &[u8], offset: u64) -> Result<usize> {
        self.striped(logical).write(data, offset)
    }

    pub fn read(&self, logical: &Path, size: usize, offset: u64) -> Result<Vec<u8>> {
        self.striped(logical).read(size, offset)
    }

    /// Nothing is held open between calls
    pub fn release(&self, _logical: &Path) -> Result<()> {
        Ok(())
    }

    pub fn unlink(&self, logical: &Path) -> Result<()> {
        self.fan_out(Operation::Unlink, logical, |physical| fs::remove_file(physical))
    }

    /// Set access and modification times; `None` leaves a time unchanged.
    ///
    /// Times are set by path, so only ownership is needed, not read access.
    pub fn set_times(
        &self,
        logical: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        let atime = timespec(atime)?;
        let mtime = timespec(mtime)?;

        self.fan_out(Operation::SetTimes, logical, |physical| {
            utimensat(None, physical, &atime, &mtime, UtimensatFlags::FollowSymlink)
                .map_err(io::Error::from)
        })
    }

    pub fn truncate(&self, logical: &Path, length: u64) -> Result<()> {
        self.striped(logical).truncate(length)
    }

    /// Handles are not cached; this is [`Driver::truncate`]
    pub fn truncate_by_handle(&self, logical: &Path, _fh: u64, length: u64) -> Result<()> {
        self.truncate(logical, length)
    }

    pub fn statistics(&self) -> FsStats {
        PLACEHOLDER_STATS
    }

    /// Default handler for operations outside the implemented set
    pub fn unsupported(&self, op: Operation) -> Error {
        warn!("{} is not implemented", op);
        Error::Unsupported(op)
    }
}

/// Run `action` on each stripe's target in index order, stopping at the first
/// error. Stripes already visited keep the change.
fn apply_in_order<T, I, F>(op: Operation, logical: &Path, targets: I, mut action: F) -> Result<()>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> io::Result<()>,
{
    for (index, target) in targets.into_iter().enumerate() {
        if let Err(e) = action(target) {
            if index > 0 {
                warn!(
                    "{} {:?} failed on stripe {}, stripes 0..{} already changed: {}",
                    op, logical, index, index, e
                );
            }
            return Err(e.into());
        }
    }
    Ok(())
}

/// `UTIME_OMIT` for `None`
fn timespec(time: Option<SystemTime>) -> Result<TimeSpec> {
    match time {
        None => Ok(TimeSpec::new(0, libc::UTIME_OMIT as _)),
        Some(time) => time
            .duration_since(UNIX_EPOCH)
            .map(TimeSpec::from)
            .map_err(|_| Error::InvalidArgument(format!("{:?} is before the epoch", time))),
    }
}

fn is_root(logical: &Path) -> bool {
    logical.components().all(|c| !matches!(c, std::path::Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        stripes: Vec<PathBuf>,
        driver: Driver,
    }

    fn fixture(stripe_count: usize, chunk_size: u64) -> Fixture {
        let dir = tempdir().unwrap();
        let mountpoint = dir.path().join("mnt");
        fs::create_dir(&mountpoint).unwrap();
        let stripes: Vec<PathBuf> = (1..=stripe_count)
            .map(|i| {
                let stripe = dir.path().join(format!("stripe{}", i));
                fs::create_dir(&stripe).unwrap();
                stripe
            })
            .collect();

        let mut config = Config::new(&mountpoint, stripes.clone(), chunk_size);
        config.identity = Some(Identity { uid: 1234, gid: 5678 });
        let driver = Driver::new(&config).unwrap();

        Fixture {
            _dir: dir,
            stripes,
            driver,
        }
    }

    #[test]
    fn test_new_rejects_single_stripe() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path(), vec![dir.path().to_path_buf()], 1024);
        assert!(matches!(Driver::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_root_attributes() {
        let fx = fixture(2, 4);
        let attr = fx.driver.get_attributes(Path::new("/")).unwrap();
        assert_eq!(attr.kind, FileKind::Directory);
        assert_eq!(attr.uid, 1234);
        assert_eq!(attr.gid, 5678);
    }

    #[test]
    fn test_create_makes_every_stripe_file() {
        let fx = fixture(3, 4);
        fx.driver.create(Path::new("/file"), 0o100640).unwrap();

        for (i, stripe) in fx.stripes.iter().enumerate() {
            let physical = stripe.join(format!("file.{}", i + 1));
            let meta = fs::metadata(&physical).unwrap();
            assert_eq!(meta.permissions().mode() & 0o7777, 0o640);
        }

        let attr = fx.driver.get_attributes(Path::new("/file")).unwrap();
        assert_eq!(attr.kind, FileKind::RegularFile);
        assert_eq!(attr.size, 0);
        assert_eq!(attr.perm, 0o640);
    }

    #[test]
    fn test_create_does_not_truncate_existing() {
        let fx = fixture(2, 4);
        let path = Path::new("/keep");
        fx.driver.create(path, 0o644).unwrap();
        fx.driver.write(path, b"persist", 0).unwrap();
        fx.driver.create(path, 0o644).unwrap();
        assert_eq!(fx.driver.read(path, 64, 0).unwrap(), b"persist");
    }

    #[test]
    fn test_open_validates_existence() {
        let fx = fixture(2, 4);
        let err = fx.driver.open(Path::new("/absent"), libc::O_RDONLY).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);

        fx.driver.create(Path::new("/present"), 0o644).unwrap();
        fx.driver.open(Path::new("/present"), libc::O_RDWR).unwrap();
    }

    #[test]
    fn test_open_with_truncate_empties_file() {
        let fx = fixture(2, 4);
        let path = Path::new("/t");
        fx.driver.create(path, 0o644).unwrap();
        fx.driver.write(path, b"0123456789", 0).unwrap();
        fx.driver.open(path, libc::O_WRONLY | libc::O_TRUNC).unwrap();
        assert_eq!(fx.driver.get_attributes(path).unwrap().size, 0);
    }

    #[test]
    fn test_mkdir_fans_out_with_suffixes() {
        let fx = fixture(2, 4);
        fx.driver.make_directory(Path::new("/a"), 0o755).unwrap();
        fx.driver.make_directory(Path::new("/a/b"), 0o755).unwrap();

        assert!(fx.stripes[0].join("a.1").join("b.1").is_dir());
        assert!(fx.stripes[1].join("a.2").join("b.2").is_dir());

        fx.driver.remove_directory(Path::new("/a/b")).unwrap();
        assert!(!fx.stripes[0].join("a.1").join("b.1").exists());
        assert!(!fx.stripes[1].join("a.2").join("b.2").exists());
    }

    #[test]
    fn test_list_directory_strips_suffix() {
        let fx = fixture(2, 4);
        fx.driver.make_directory(Path::new("/docs"), 0o755).unwrap();
        fx.driver.create(Path::new("/docs/b.txt"), 0o644).unwrap();
        fx.driver.create(Path::new("/docs/a.txt"), 0o644).unwrap();
        fx.driver.make_directory(Path::new("/docs/sub"), 0o755).unwrap();
        fs::write(fx.stripes[0].join("docs.1").join("stray"), b"").unwrap();

        let entries = fx.driver.list_directory(Path::new("/docs")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[2].kind, FileKind::Directory);
        assert_eq!(entries[0].kind, FileKind::RegularFile);
    }

    #[test]
    fn test_rename_moves_every_stripe() {
        let fx = fixture(3, 4);
        fx.driver.create(Path::new("/old"), 0o644).unwrap();
        fx.driver.write(Path::new("/old"), b"hello striped world", 0).unwrap();
        fx.driver.rename(Path::new("/old"), Path::new("/new")).unwrap();

        for (i, stripe) in fx.stripes.iter().enumerate() {
            assert!(!stripe.join(format!("old.{}", i + 1)).exists());
            assert!(stripe.join(format!("new.{}", i + 1)).exists());
        }
        assert_eq!(
            fx.driver.read(Path::new("/new"), 100, 0).unwrap(),
            b"hello striped world"
        );
    }

    #[test]
    fn test_unlink_removes_every_stripe() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/gone"), 0o644).unwrap();
        fx.driver.unlink(Path::new("/gone")).unwrap();
        assert!(!fx.stripes[0].join("gone.1").exists());
        assert!(!fx.stripes[1].join("gone.2").exists());
        assert!(fx.driver.get_attributes(Path::new("/gone")).is_err());
    }

    #[test]
    fn test_chmod_fans_out() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/m"), 0o644).unwrap();
        fx.driver.change_mode(Path::new("/m"), 0o600).unwrap();
        for (i, stripe) in fx.stripes.iter().enumerate() {
            let meta = fs::metadata(stripe.join(format!("m.{}", i + 1))).unwrap();
            assert_eq!(meta.permissions().mode() & 0o7777, 0o600);
        }
    }

    #[test]
    fn test_chown_to_self_succeeds() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/o"), 0o644).unwrap();
        let me = Identity::current();
        fx.driver
            .change_owner(Path::new("/o"), Some(me.uid), Some(me.gid))
            .unwrap();
        fx.driver.change_owner(Path::new("/o"), None, None).unwrap();
    }

    #[test]
    fn test_set_times_fans_out() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/t"), 0o644).unwrap();
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fx.driver
            .set_times(Path::new("/t"), Some(when), Some(when))
            .unwrap();

        for (i, stripe) in fx.stripes.iter().enumerate() {
            let meta = fs::metadata(stripe.join(format!("t.{}", i + 1))).unwrap();
            assert_eq!(meta.modified().unwrap(), when);
        }
        assert_eq!(fx.driver.get_attributes(Path::new("/t")).unwrap().mtime, when);
    }

    #[test]
    fn test_set_times_without_read_permission() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/w"), 0o644).unwrap();
        fx.driver.change_mode(Path::new("/w"), 0o200).unwrap();

        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(2_000_000);
        fx.driver
            .set_times(Path::new("/w"), Some(when), Some(when))
            .unwrap();

        for (i, stripe) in fx.stripes.iter().enumerate() {
            let meta = fs::metadata(stripe.join(format!("w.{}", i + 1))).unwrap();
            assert_eq!(meta.modified().unwrap(), when);
            assert_eq!(meta.permissions().mode() & 0o777, 0o200);
        }
    }

    #[test]
    fn test_set_times_leaves_missing_time_unchanged() {
        let fx = fixture(2, 4);
        fx.driver.create(Path::new("/t"), 0o644).unwrap();
        let first = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        let second = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(3_000_000);
        fx.driver
            .set_times(Path::new("/t"), Some(first), Some(first))
            .unwrap();

        fx.driver.set_times(Path::new("/t"), Some(second), None).unwrap();

        let meta = fs::metadata(fx.stripes[1].join("t.2")).unwrap();
        assert_eq!(meta.modified().unwrap(), first);
        assert_eq!(meta.accessed().unwrap(), second);
    }

    #[test]
    fn test_new_rejects_overflowing_chunk_size() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let config = Config::new(dir.path(), vec![a, b], 1 << 63);
        assert!(matches!(Driver::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_rename_is_not_rolled_back() {
        let fx = fixture(3, 4);
        fx.driver.create(Path::new("/r"), 0o644).unwrap();
        // the source is gone on stripe 1, so the rename stops there
        fs::remove_file(fx.stripes[1].join("r.2")).unwrap();

        let err = fx.driver.rename(Path::new("/r"), Path::new("/s")).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
        assert!(fx.stripes[0].join("s.1").is_file());
        assert!(fx.stripes[2].join("r.3").is_file());
        assert!(!fx.stripes[2].join("s.3").exists());
    }

    #[test]
    fn test_partial_fan_out_is_not_rolled_back() {
        let fx = fixture(3, 4);
        // stripe 1 already has the directory, so mkdir fails there
        fs::create_dir(fx.stripes[1].join("clash.2")).unwrap();

        let err = fx.driver.make_directory(Path::new("/clash"), 0o755).unwrap_err();
        assert_eq!(err.to_errno(), libc::EEXIST);
        assert!(fx.stripes[0].join("clash.1").is_dir());
        assert!(!fx.stripes[2].join("clash.3").exists());
    }

    #[test]
    fn test_unsupported_operation() {
        let fx = fixture(2, 4);
        for op in [Operation::Symlink, Operation::Link, Operation::GetXattr] {
            assert!(!op.is_supported());
            let err = fx.driver.unsupported(op);
            assert_eq!(err.to_errno(), libc::ENOSYS);
        }
        assert!(Operation::Truncate.is_supported());
    }

    #[test]
    fn test_statistics_are_placeholders() {
        let fx = fixture(2, 4);
        let stats = fx.driver.statistics();
        assert_eq!(stats.block_size, 1024);
        assert_eq!(stats.blocks, 1_000_000);
    }

    #[test]
    fn test_is_root() {
        assert!(is_root(Path::new("/")));
        assert!(is_root(Path::new("")));
        assert!(!is_root(Path::new("/a")));
    }
}
