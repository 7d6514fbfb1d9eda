//! FUSE binding for StripeFS

pub mod filesystem;
pub mod inode;

pub use filesystem::StripeFuse;
pub use inode::{InodeTable, ROOT_INODE};

use fuser::MountOption;
use tracing::info;

use crate::config::{Config, MountConfig};
use crate::driver::Driver;
use crate::error::Result;

/// Mount options for a mount configuration
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![MountOption::FSName(config.fs_name.clone())];
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Mount StripeFS and serve requests until unmounted (this blocks)
pub fn mount(config: &Config) -> Result<()> {
    let driver = Driver::new(config)?;
    let fs = StripeFuse::new(driver);

    info!("Mounting StripeFS at {:?}", config.mount.path);
    fuser::mount2(fs, &config.mount.path, &mount_options(&config.mount))?;
    info!("StripeFS at {:?} unmounted", config.mount.path);

    Ok(())
}
