//! StripeFS - Stackable Striping File System
//!
//! Mounts N stripe directories as one filesystem with file contents laid
//! out round-robin in fixed-size chunks.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stripefs::config::DEFAULT_CHUNK_SIZE;
use stripefs::Config;

/// StripeFS - stackable striping file system
#[derive(Parser)]
#[command(name = "stripefs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount stripe directories as one filesystem
    Mount {
        /// Mount point path
        mountpoint: PathBuf,

        /// Stripe directories, in layout order
        #[arg(short = 's', long = "stripe", num_args = 1..)]
        stripes: Vec<PathBuf>,

        /// Chunk size in bytes
        #[arg(short = 'c', long)]
        chunk_size: Option<u64>,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },

    /// Unmount a StripeFS mount
    Unmount {
        /// Mount point path
        mountpoint: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(if cli.debug { "debug" } else { "info" });

    match cli.command {
        Commands::Mount {
            mountpoint,
            stripes,
            chunk_size,
            config,
            allow_other,
        } => run_mount(mountpoint, stripes, chunk_size, config, allow_other),
        Commands::Unmount { mountpoint } => run_unmount(mountpoint),
    }
}

/// Initialize logging, RUST_LOG overrides the default level
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the configuration (file first, then flags) and mount
fn run_mount(
    mountpoint: PathBuf,
    stripes: Vec<PathBuf>,
    chunk_size: Option<u64>,
    config_path: Option<PathBuf>,
    allow_other: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::new(&mountpoint, Vec::new(), DEFAULT_CHUNK_SIZE),
    };

    config.mount.path = mountpoint;
    if !stripes.is_empty() {
        config.stripe.roots = stripes;
    }
    if let Some(chunk_size) = chunk_size {
        config.stripe.chunk_size = chunk_size;
    }
    if allow_other {
        config.mount.allow_other = true;
    }

    config.validate().context("invalid mount arguments")?;
    stripefs::fuse::mount(&config).context("mount failed")?;
    Ok(())
}

/// Unmount via fusermount
fn run_unmount(mountpoint: PathBuf) -> Result<()> {
    info!("Unmounting StripeFS at {:?}", mountpoint);

    let status = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(&mountpoint)
        .status()
        .context("failed to run fusermount")?;

    if !status.success() {
        bail!("unmount failed with status: {}", status);
    }

    info!("Unmounted successfully");
    Ok(())
}
