//! Development automation tasks for the MEK workspace.
//!
//! # Usage
//!
//! ```bash
//! cargo xtask <command>
//! ```
//!
//! # Commands
//!
//! - `boundary` - Verify the intelligence sandbox boundary: the
//!   `mek-intelligence` crate must declare no dependency edge into
//!   `mek-kernel`, in its manifest or its sources. CI runs this on every
//!   change; a violation fails the build.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod tasks;

/// Development automation for the MEK workspace.
#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development automation tasks for MEK", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available xtask commands.
#[derive(Subcommand)]
enum Commands {
    /// Verify the intelligence sandbox boundary.
    ///
    /// Fails if crates/mek-intelligence declares a dependency on the
    /// kernel crate or references it from source.
    Boundary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Boundary => tasks::boundary::run(),
    }
}
