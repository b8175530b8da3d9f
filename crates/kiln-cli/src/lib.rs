//! kiln - resolve and build package blueprints
//!
//! Loads TOML blueprints from one or more blueprint roots, resolves the
//! dependency graph of the requested packages into a deterministic build
//! plan and runs it against CMake.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.kiln/
//! ├── config.toml   # Optional settings
//! ├── blueprints/   # Default blueprint root
//! ├── sources/      # Unpacked source trees, one per package
//! ├── build/        # Out-of-tree build directories
//! ├── root/         # Install prefix
//! └── logs/         # Per-step build logs
//! ```
//!
//! # Exit codes
//!
//! - `0`: success
//! - `1`: a build failed, the run was cancelled, or another runtime error
//! - `2`: resolution failed (bad blueprint, unknown package, cycle, missing version)

#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use kiln_core::PackageRequest;
use std::path::PathBuf;

/// Exit code for resolution-time failures.
pub const EXIT_RESOLVE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "kiln - resolve and build package blueprints")]
pub struct Cli {
    /// Blueprint root directory (repeatable; replaces the configured roots
    /// and KILN_BLUEPRINTS, a PATH-style list)
    #[arg(long = "blueprints", short = 'b', global = true)]
    pub blueprints: Vec<PathBuf>,

    /// Configuration file (defaults to ~/.kiln/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the build plan for one or more packages
    Resolve {
        /// Package name(s), optionally with version: pkg or pkg@2.6
        #[arg(required = true)]
        packages: Vec<PackageRequest>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve and build one or more packages
    Build {
        /// Package name(s), optionally with version: pkg or pkg@2.6
        #[arg(required = true)]
        packages: Vec<PackageRequest>,
        /// Maximum number of packages built at once
        #[arg(long, short = 'j')]
        concurrency: Option<usize>,
        /// Walk the plan without running CMake
        #[arg(long)]
        dry_run: bool,
    },
    /// List available blueprints
    List,
    /// Show a blueprint's details
    Info {
        /// Package name
        package: String,
    },
    /// Validate every blueprint and its dependency closure
    Check,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
