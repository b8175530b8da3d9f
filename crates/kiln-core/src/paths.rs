//! Filesystem locations under the kiln home directory.

use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
pub fn try_kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Returns the kiln home directory (`~/.kiln`), falling back to `./.kiln`
/// when neither `KILN_HOME` nor a home directory is available.
pub fn kiln_home() -> PathBuf {
    try_kiln_home().unwrap_or_else(|| PathBuf::from(".kiln"))
}

/// Configuration file: ~/.kiln/config.toml
pub fn config_path() -> PathBuf {
    kiln_home().join("config.toml")
}

/// Default blueprint root: ~/.kiln/blueprints
pub fn blueprints_dir() -> PathBuf {
    kiln_home().join("blueprints")
}

/// Unpacked source trees: ~/.kiln/sources
pub fn sources_dir() -> PathBuf {
    kiln_home().join("sources")
}

/// Out-of-tree build directories: ~/.kiln/build
pub fn build_dir() -> PathBuf {
    kiln_home().join("build")
}

/// Install prefix: ~/.kiln/root
pub fn install_prefix() -> PathBuf {
    kiln_home().join("root")
}

/// Logs directory: ~/.kiln/logs
pub fn log_dir() -> PathBuf {
    kiln_home().join("logs")
}

/// Directory name for a package inside the sources/build trees
/// (`libs/qt/qtbase` -> `libs-qt-qtbase`).
pub fn package_dir_name(package: &str) -> String {
    package.replace(['/', '\\'], "-")
}

/// Generate a step log path for a package under `log_dir`.
pub fn step_log_path(log_dir: &Path, package: &str, step: &str) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    log_dir.join(format!("{}-{step}-{timestamp}.log", package_dir_name(package)))
}
