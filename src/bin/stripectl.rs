//! StripeCtl - Inspection tool for StripeFS stripe sets
//!
//! Usage:
//!   stripectl resolve PATH -s DIR...      - Show the physical paths of a logical path
//!   stripectl locate -c C -n N OFFSET     - Show where a logical byte is stored
//!   stripectl plan -c C -n N LENGTH       - Show per-stripe lengths after truncate
//!   stripectl check -s DIR... [--json]    - Check the stripe trees for consistency

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stripefs::config::DEFAULT_CHUNK_SIZE;
use stripefs::{Checker, Layout, StripeSet};

/// StripeFS inspection tool
#[derive(Parser)]
#[command(name = "stripectl")]
#[command(author, version, about = "Inspect and check StripeFS stripe sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the physical path of a logical path on every stripe
    Resolve {
        /// Stripe directories, in layout order
        #[arg(short = 's', long = "stripe", num_args = 1.., required = true)]
        stripes: Vec<PathBuf>,

        /// Logical path, e.g. /dir/file
        path: PathBuf,
    },

    /// Print the stripe and physical offset holding a logical byte
    Locate {
        /// Chunk size in bytes
        #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Number of stripes
        #[arg(short = 'n', long)]
        stripes: usize,

        /// Logical byte offset
        offset: u64,
    },

    /// Print the length of every stripe file for a logical length
    Plan {
        /// Chunk size in bytes
        #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Number of stripes
        #[arg(short = 'n', long)]
        stripes: usize,

        /// Logical file length
        length: u64,
    },

    /// Check that the stripe trees agree with each other
    Check {
        /// Stripe directories, in layout order
        #[arg(short = 's', long = "stripe", num_args = 1.., required = true)]
        stripes: Vec<PathBuf>,

        /// Chunk size in bytes
        #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Resolve { stripes, path } => {
            let set = StripeSet::new(stripes)?;
            for (index, physical) in set.resolve(&path).iter().enumerate() {
                println!("stripe {}: {}", index, physical.display());
            }
        }

        Commands::Locate {
            chunk_size,
            stripes,
            offset,
        } => {
            let layout = Layout::new(chunk_size, stripes)?;
            let address = layout.translate(offset);
            println!("Chunk:            {}", offset / chunk_size);
            println!("Stripe:           {}", address.stripe_index);
            println!("Physical offset:  {}", address.physical_offset);
            println!("Bytes in chunk:   {}", address.bytes_available);
        }

        Commands::Plan {
            chunk_size,
            stripes,
            length,
        } => {
            let layout = Layout::new(chunk_size, stripes)?;
            for (index, len) in layout.stripe_lengths(length).iter().enumerate() {
                println!("stripe {}: {}", index, len);
            }
        }

        Commands::Check {
            stripes,
            chunk_size,
            json,
        } => {
            let set = StripeSet::new(stripes)?;
            let layout = Layout::new(chunk_size, set.len())?;
            let report = Checker::new(&set, layout)
                .run()
                .context("check aborted")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for finding in &report.findings {
                    println!("{}", finding);
                }
                println!(
                    "Checked {} directories, {} files: {} findings",
                    report.directories,
                    report.files,
                    report.findings.len()
                );
            }

            if report.has_errors() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
