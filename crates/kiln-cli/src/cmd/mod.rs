//! Subcommand implementations.

pub mod build;
pub mod check;
pub mod completions;
pub mod info;
pub mod list;
pub mod resolve;

use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use kiln_core::{Config, DescriptorStore};

use crate::Cli;

/// Environment variable holding blueprint roots, separated like `PATH`.
pub const BLUEPRINTS_ENV: &str = "KILN_BLUEPRINTS";

/// Configuration and loaded blueprints shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub store: DescriptorStore,
    pub quiet: bool,
}

impl Context {
    /// Load configuration, then every blueprint root.
    ///
    /// Roots given with `--blueprints` or `KILN_BLUEPRINTS` replace the
    /// configured ones and must exist. Configured roots that do not exist
    /// yet are skipped.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("Failed to load configuration")?;

        let explicit = if cli.blueprints.is_empty() {
            std::env::var_os(BLUEPRINTS_ENV)
                .map(|value| split_roots(&value))
                .unwrap_or_default()
        } else {
            cli.blueprints.clone()
        };

        let roots = if explicit.is_empty() {
            config
                .blueprint_dirs
                .iter()
                .filter(|root| {
                    let exists = root.is_dir();
                    if !exists {
                        tracing::debug!(
                            root = %root.display(),
                            "configured blueprint root missing, skipped"
                        );
                    }
                    exists
                })
                .cloned()
                .collect()
        } else {
            explicit
        };

        let mut store = DescriptorStore::new(config.duplicates);
        for root in &roots {
            let count = store.load_dir(root)?;
            tracing::debug!(root = %root.display(), count, "blueprint root loaded");
        }

        Ok(Self {
            config,
            store,
            quiet: cli.quiet,
        })
    }
}

/// Split a `PATH`-style list of roots, dropping empty entries.
pub fn split_roots(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}
