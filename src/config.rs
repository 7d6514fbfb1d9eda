//! Configuration types for StripeFS

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mount options
    #[serde(default)]
    pub mount: MountConfig,

    /// Stripe layout
    #[serde(default)]
    pub stripe: StripeConfig,

    /// Ownership reported for every logical object.
    /// Defaults to the identity of the mounting process.
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount point path
    #[serde(default = "default_mount_path")]
    pub path: PathBuf,

    /// Allow other users to access the mount
    #[serde(default)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[serde(default = "default_auto_unmount")]
    pub auto_unmount: bool,

    /// Filesystem name shown in the mount table
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
}

fn default_mount_path() -> PathBuf {
    PathBuf::from("/mnt/stripefs")
}

fn default_auto_unmount() -> bool {
    true
}

fn default_fs_name() -> String {
    "stripefs".to_string()
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            path: default_mount_path(),
            allow_other: false,
            auto_unmount: default_auto_unmount(),
            fs_name: default_fs_name(),
        }
    }
}

/// Stripe layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    /// Ordered stripe directories. Order is part of the on-disk layout.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Chunk size in bytes (default 1KB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

/// Default chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: u64 = 1024;

/// Minimum number of stripes for a mount
pub const MIN_STRIPES: usize = 2;

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Owner reported for logical objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Identity of the current process
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

impl Config {
    /// Build a configuration from a mount point and stripe list
    pub fn new(mountpoint: impl Into<PathBuf>, roots: Vec<PathBuf>, chunk_size: u64) -> Self {
        Self {
            mount: MountConfig {
                path: mountpoint.into(),
                ..MountConfig::default()
            },
            stripe: StripeConfig { roots, chunk_size },
            identity: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the mount arguments before anything touches the stripes
    pub fn validate(&self) -> Result<()> {
        if self.stripe.roots.len() < MIN_STRIPES {
            return Err(Error::Config(format!(
                "number of stripes must be at least {}, got {}",
                MIN_STRIPES,
                self.stripe.roots.len()
            )));
        }

        if self.stripe.chunk_size == 0 {
            return Err(Error::Config("stripe.chunk_size must be positive".into()));
        }

        if self
            .stripe
            .chunk_size
            .checked_mul(self.stripe.roots.len() as u64)
            .is_none()
        {
            return Err(Error::Config(format!(
                "stripe.chunk_size {} is too large for {} stripes",
                self.stripe.chunk_size,
                self.stripe.roots.len()
            )));
        }

        if !self.mount.path.is_dir() {
            return Err(Error::Config(format!(
                "mountpoint {} is not a directory",
                self.mount.path.display()
            )));
        }

        for root in &self.stripe.roots {
            if !root.is_dir() {
                return Err(Error::Config(format!(
                    "stripe target {} is not a directory",
                    root.display()
                )));
            }
        }

        Ok(())
    }

    /// Identity reported to callers, falling back to the process identity
    pub fn identity(&self) -> Identity {
        self.identity.unwrap_or_else(Identity::current)
    }
}
