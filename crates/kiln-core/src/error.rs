//! Error taxonomy.
//!
//! Everything in [`ResolveError`] is detected before the first build step
//! runs and aborts the whole invocation. [`BackendError`] is raised while
//! executing a plan and only affects the failing node and its dependents.

use std::fmt;
use std::path::PathBuf;

use kiln_schema::{PackageName, ParseError, Version};
use thiserror::Error;

/// Resolution-time failures.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A blueprint could not be parsed or validated.
    #[error("{source_id}: {error}")]
    Parse {
        /// Path or identifier of the offending blueprint.
        source_id: String,
        /// Underlying parse failure.
        error: ParseError,
    },

    /// A blueprint file or directory could not be read.
    #[error("failed to read {}: {error}", .path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O failure.
        error: std::io::Error,
    },

    /// Two different sources declare the same package.
    #[error("package '{name}' is declared by both {first} and {second}")]
    DuplicateDescriptor {
        /// The contested package name.
        name: PackageName,
        /// Source registered first.
        first: String,
        /// Source that attempted to register it again.
        second: String,
    },

    /// A requested package is not in the store.
    #[error("package '{0}' not found")]
    NotFound(PackageName),

    /// A descriptor depends on a package that is not in the store.
    #[error("package '{package}' depends on '{dependency}', which is not in the store")]
    MissingDependency {
        /// Package declaring the dependency.
        package: PackageName,
        /// The unknown dependency.
        dependency: PackageName,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency: {}", format_cycle(.cycle))]
    Cycle {
        /// Nodes of the cycle in traversal order.
        cycle: Vec<PackageName>,
    },

    /// A constraint names a version the target does not declare.
    #[error("{}", format_version_not_found(.package, .version, .required_by.as_ref()))]
    VersionNotFound {
        /// Package that lacks the version.
        package: PackageName,
        /// The missing version.
        version: Version,
        /// Dependent that asked for it; `None` for a root request.
        required_by: Option<PackageName>,
    },

    /// Two constraints on one package resolve to different versions.
    #[error("package '{package}' is required at both '{first}' and '{second}'")]
    VersionConflict {
        /// Package with conflicting requirements.
        package: PackageName,
        /// Version selected first.
        first: Version,
        /// Competing version.
        second: Version,
    },
}

impl ResolveError {
    /// Wrap a parse failure with the source it came from.
    pub fn parse(source_id: impl Into<String>, error: ParseError) -> Self {
        Self::Parse {
            source_id: source_id.into(),
            error,
        }
    }
}

fn format_cycle(cycle: &[PackageName]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(PackageName::as_str).collect();
    if let Some(first) = parts.first().copied() {
        parts.push(first);
    }
    parts.join(" -> ")
}

fn format_version_not_found(
    package: &PackageName,
    version: &Version,
    required_by: Option<&PackageName>,
) -> String {
    match required_by {
        Some(dependent) => format!(
            "package '{dependent}' requires '{package}' at version '{version}', which is not declared"
        ),
        None => format!("package '{package}' has no version '{version}'"),
    }
}

/// One of the three backend steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Generate the build tree.
    Configure,
    /// Compile.
    Build,
    /// Install into the prefix.
    Install,
}

impl Step {
    /// Lower-case step name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configure, build or install step failed.
///
/// `message` carries the backend's raw diagnostic (for the CMake backend,
/// the tail of the step log).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} failed: {message}")]
pub struct BackendError {
    /// Step that failed.
    pub step: Step,
    /// Raw diagnostic from the backend.
    pub message: String,
}

impl BackendError {
    /// Create an error for `step`.
    pub fn new(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}
