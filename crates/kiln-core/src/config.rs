//! User configuration (`~/.kiln/config.toml`).
//!
//! Every field has a default so an absent or partial file is fine. Command
//! line flags override whatever is loaded here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

/// Errors that can occur while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {error}", .path.display())]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O failure.
        error: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("invalid configuration in {}: {error}", .path.display())]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying parse failure.
        error: toml::de::Error,
    },
}

/// What the descriptor store does when two sources declare the same package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Refuse to load the second declaration.
    #[default]
    Error,
    /// The source loaded last replaces the earlier one.
    LastWins,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Blueprint roots, loaded in order.
    pub blueprint_dirs: Vec<PathBuf>,
    /// Maximum number of packages built at once.
    pub concurrency: usize,
    /// Duplicate descriptor handling.
    pub duplicates: DuplicatePolicy,
    /// Settings for the CMake backend.
    pub cmake: CmakeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blueprint_dirs: vec![paths::blueprints_dir()],
            concurrency: num_cpus::get().max(1),
            duplicates: DuplicatePolicy::default(),
            cmake: CmakeConfig::default(),
        }
    }
}

/// Settings for the CMake backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CmakeConfig {
    /// `-G` generator; CMake's platform default when unset.
    pub generator: Option<String>,
    /// `CMAKE_BUILD_TYPE`.
    pub build_type: String,
    /// Root holding unpacked source trees.
    pub sources_dir: PathBuf,
    /// Root for out-of-tree build directories.
    pub build_dir: PathBuf,
    /// `CMAKE_INSTALL_PREFIX`.
    pub install_prefix: PathBuf,
    /// Where per-step logs are written.
    pub log_dir: PathBuf,
    /// Parallel jobs per `cmake --build`; logical CPUs when unset.
    pub jobs: Option<usize>,
}

impl Default for CmakeConfig {
    fn default() -> Self {
        Self {
            generator: None,
            build_type: "RelWithDebInfo".to_string(),
            sources_dir: paths::sources_dir(),
            build_dir: paths::build_dir(),
            install_prefix: paths::install_prefix(),
            log_dir: paths::log_dir(),
            jobs: None,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// See [`Config::load_from`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&paths::config_path())
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    error,
                });
            }
        };

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `toml::de::Error` if the content is invalid.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.concurrency = config.concurrency.max(1);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::parse(
            r#"
concurrency = 2
duplicates = "last-wins"

[cmake]
generator = "Ninja"
"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.duplicates, DuplicatePolicy::LastWins);
        assert_eq!(config.cmake.generator.as_deref(), Some("Ninja"));
        assert_eq!(config.cmake.build_type, "RelWithDebInfo");
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = Config::parse("concurrency = 0").unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("paralel = 4").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.duplicates, DuplicatePolicy::Error);
        assert!(config.concurrency >= 1);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
