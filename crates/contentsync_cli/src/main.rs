//! ContentSync CLI
//!
//! Command-line tools for ContentSync maintenance.
//!
//! # Commands
//!
//! - `gid` - Decode and canonicalize a global identifier
//! - `export` - Export a root object from a node fixture into an archive
//! - `inspect` - List the contents of an export archive

mod commands;
mod fixture;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ContentSync command-line tools.
#[derive(Parser)]
#[command(name = "contentsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and canonicalize a global identifier
    Gid {
        /// The identifier, e.g. 1-10 or 1-10-example.org
        gid: String,
    },

    /// Export a root object from a node fixture into an archive
    Export {
        /// Path to the node fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Root content id to export
        #[arg(short, long)]
        root: u64,

        /// Output archive path
        #[arg(short, long)]
        out: PathBuf,

        /// Skip nested references
        #[arg(long)]
        no_nested: bool,

        /// Normalize navigation blocks into custom links
        #[arg(long)]
        resolve_menus: bool,
    },

    /// List the contents of an export archive
    Inspect {
        /// Archive path
        archive: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Gid { gid } => commands::gid::run(&gid)?,
        Commands::Export {
            fixture,
            root,
            out,
            no_nested,
            resolve_menus,
        } => commands::archive::export(&fixture, root, &out, !no_nested, resolve_menus)?,
        Commands::Inspect { archive } => commands::archive::inspect(&archive)?,
    }

    Ok(())
}
