//! Blueprint parsing and the validated [`PackageDescriptor`].
//!
//! Blueprints are TOML files, one package per file. Parsing happens in two
//! passes: `serde` maps the file onto raw section structs, then
//! [`PackageDescriptor::from_toml`] validates the cross-field rules (default
//! version declared, constraints well-formed, sources consistent) and
//! produces the immutable descriptor the rest of kiln works with.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PackageName, Version, VersionConstraint};

/// Errors raised while parsing or validating a blueprint.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The file is not valid TOML or does not match the blueprint schema.
    #[error("malformed blueprint: {0}")]
    Toml(#[from] toml::de::Error),

    /// `[package] name` is empty after normalization.
    #[error("package name is empty")]
    EmptyName,

    /// The `[versions]` table is missing or empty.
    #[error("package '{0}' declares no versions")]
    NoVersions(PackageName),

    /// `default_version` names a version the blueprint does not declare.
    #[error("package '{package}': default version '{version}' is not among its declared versions")]
    DefaultVersionMissing {
        /// Offending package.
        package: PackageName,
        /// The undeclared default.
        version: Version,
    },

    /// A dependency value is neither a version nor `"default"`.
    #[error(
        "package '{package}': dependency '{dependency}' has invalid constraint '{value}' (expected a version or \"default\")"
    )]
    InvalidConstraint {
        /// Package declaring the dependency.
        package: PackageName,
        /// Name of the dependency.
        dependency: String,
        /// The raw constraint value.
        value: String,
    },

    /// Two dependency keys name the same package once normalized.
    #[error("package '{package}' lists dependency '{dependency}' more than once")]
    DuplicateDependency {
        /// Package declaring the dependencies.
        package: PackageName,
        /// The normalized dependency name.
        dependency: PackageName,
    },

    /// A version entry has an inconsistent source location.
    #[error("package '{package}': version '{version}': {reason}")]
    InvalidSource {
        /// Offending package.
        package: PackageName,
        /// Offending version.
        version: Version,
        /// What is wrong with the entry.
        reason: &'static str,
    },
}

/// Where the sources for one version of a package come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceLocation {
    /// A release archive.
    Archive {
        /// Download URL of the archive.
        url: String,
        /// File name to store the archive under, when it differs from the URL.
        archive_name: Option<String>,
        /// Sub-directory of the unpacked archive holding the source tree.
        source_dir: Option<String>,
    },
    /// A version-control checkout.
    Vcs {
        /// Repository URL.
        url: String,
        /// Branch or tag to check out; the repository default when absent.
        branch: Option<String>,
        /// Sub-directory of the checkout holding the source tree.
        source_dir: Option<String>,
    },
    /// No sources at all. Only valid for virtual packages.
    Empty,
}

impl SourceLocation {
    /// Sub-directory holding the source tree, if the blueprint names one.
    pub fn source_dir(&self) -> Option<&str> {
        match self {
            Self::Archive { source_dir, .. } | Self::Vcs { source_dir, .. } => {
                source_dir.as_deref().filter(|s| !s.is_empty())
            }
            Self::Empty => None,
        }
    }

    /// Short human-readable form used in listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Archive { url, .. } => url.clone(),
            Self::Vcs {
                url,
                branch: Some(branch),
                ..
            } => format!("{url} ({branch})"),
            Self::Vcs { url, .. } => url.clone(),
            Self::Empty => "-".to_string(),
        }
    }
}

/// Which packager a descriptor's metadata targets.
///
/// Only app-store style packagers consume a display name, so it lives on
/// that variant instead of being an optional field every packager has to
/// ignore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackagingTarget {
    /// Plain installer or archive.
    Generic,
    /// App package that shows a display name to the user.
    AppPackage {
        /// Name shown by the app packager.
        display_name: String,
    },
}

/// Metadata handed to packagers once a package is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagingMetadata {
    /// Main executable, relative to the install prefix.
    pub executable: String,
    /// Installer icon. Relative in the blueprint file; the store resolves it
    /// against the blueprint's directory when loading from disk.
    pub icon: Option<String>,
    /// Packager-specific target.
    pub target: PackagingTarget,
}

/// A validated, immutable package descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Unique key in the store.
    pub name: PackageName,
    /// One-line summary.
    pub description: String,
    /// Declared versions and where their sources live.
    pub versions: BTreeMap<Version, SourceLocation>,
    /// Version built when nothing else is requested.
    pub default_version: Version,
    /// Dependencies and the version each one must resolve to.
    pub dependencies: BTreeMap<PackageName, VersionConstraint>,
    /// Extra arguments for the configure step.
    pub configure_args: Vec<String>,
    /// Packaging metadata, for packages that ship an executable.
    pub packaging: Option<PackagingMetadata>,
    /// Grouping package with nothing to build.
    pub is_virtual: bool,
}

impl PackageDescriptor {
    /// Parse and validate a blueprint from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Toml`] if the content does not match the schema,
    /// or one of the validation variants if the blueprint is inconsistent.
    pub fn from_toml(content: &str) -> Result<Self, ParseError> {
        let raw: BlueprintFile = toml::from_str(content)?;
        raw.validate()
    }

    /// Returns `true` if `version` is one of the declared versions.
    pub fn has_version(&self, version: &Version) -> bool {
        self.versions.contains_key(version)
    }

    /// Source location for a declared version.
    pub fn source(&self, version: &Version) -> Option<&SourceLocation> {
        self.versions.get(version)
    }

    /// Make a relative packaging icon relative to `blueprint_dir` instead.
    pub fn resolve_icon(&mut self, blueprint_dir: &Path) {
        let Some(icon) = self.packaging.as_mut().and_then(|p| p.icon.as_mut()) else {
            return;
        };
        if Path::new(icon.as_str()).is_relative() {
            *icon = blueprint_dir.join(icon.as_str()).display().to_string();
        }
    }
}

// ============================================================================
// Raw file layout
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlueprintFile {
    package: PackageSection,
    #[serde(default)]
    versions: BTreeMap<String, VersionSection>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    configure: ConfigureSection,
    #[serde(default)]
    packaging: Option<PackagingSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageSection {
    name: String,
    #[serde(default)]
    description: String,
    default_version: String,
    #[serde(default, rename = "virtual")]
    is_virtual: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionSection {
    url: Option<String>,
    git: Option<String>,
    branch: Option<String>,
    archive_name: Option<String>,
    source_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigureSection {
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackagingSection {
    executable: String,
    icon: Option<String>,
    display_name: Option<String>,
}

impl BlueprintFile {
    fn validate(self) -> Result<PackageDescriptor, ParseError> {
        let name = PackageName::new(&self.package.name);
        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        if self.versions.is_empty() {
            return Err(ParseError::NoVersions(name));
        }

        let mut versions = BTreeMap::new();
        for (version, section) in self.versions {
            let version = Version::new(&version);
            let source = section.into_source(&name, &version, self.package.is_virtual)?;
            versions.insert(version, source);
        }

        let default_version = Version::new(&self.package.default_version);
        if !versions.contains_key(&default_version) {
            return Err(ParseError::DefaultVersionMissing {
                package: name,
                version: default_version,
            });
        }

        let mut dependencies = BTreeMap::new();
        for (dependency, value) in self.dependencies {
            let Some(constraint) = VersionConstraint::parse(&value) else {
                return Err(ParseError::InvalidConstraint {
                    package: name,
                    dependency,
                    value,
                });
            };
            let key = PackageName::new(&dependency);
            if dependencies.contains_key(&key) {
                return Err(ParseError::DuplicateDependency {
                    package: name,
                    dependency: key,
                });
            }
            dependencies.insert(key, constraint);
        }

        let packaging = self.packaging.map(|p| PackagingMetadata {
            executable: p.executable,
            icon: p.icon,
            target: match p.display_name {
                Some(display_name) => PackagingTarget::AppPackage { display_name },
                None => PackagingTarget::Generic,
            },
        });

        Ok(PackageDescriptor {
            name,
            description: self.package.description,
            versions,
            default_version,
            dependencies,
            configure_args: self.configure.args,
            packaging,
            is_virtual: self.package.is_virtual,
        })
    }
}

impl VersionSection {
    fn into_source(
        self,
        package: &PackageName,
        version: &Version,
        is_virtual: bool,
    ) -> Result<SourceLocation, ParseError> {
        let invalid = |reason| ParseError::InvalidSource {
            package: package.clone(),
            version: version.clone(),
            reason,
        };

        match (self.url, self.git) {
            (Some(_), Some(_)) => Err(invalid("declares both `url` and `git`")),
            (Some(url), None) => {
                if self.branch.is_some() {
                    return Err(invalid("`branch` only applies to `git` sources"));
                }
                Ok(SourceLocation::Archive {
                    url,
                    archive_name: self.archive_name,
                    source_dir: self.source_dir,
                })
            }
            (None, Some(url)) => {
                if self.archive_name.is_some() {
                    return Err(invalid("`archive_name` only applies to `url` sources"));
                }
                Ok(SourceLocation::Vcs {
                    url,
                    branch: self.branch,
                    source_dir: self.source_dir,
                })
            }
            (None, None) if is_virtual => Ok(SourceLocation::Empty),
            (None, None) => Err(invalid("needs either `url` or `git`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH_SOLVER: &str = r#"
[package]
name = "stellarbatchsolver"
description = "StellarSolver based batch solver"
default_version = "2.6"

[versions."2.6"]
url = "https://github.com/rlancaste/stellarsolver/archive/refs/tags/2.6.tar.gz"
archive_name = "stellarsolver-batchsolver-2.6.tar.gz"
source_dir = "stellarsolver-2.6"

[versions.master]
git = "https://github.com/rlancaste/stellarsolver.git"

[dependencies]
"virtual/base" = "default"
"libs/qt/qtbase" = "default"
"libs/gsl" = "2.7"

[configure]
args = ["-DUSE_QT5=OFF", "-DBUILD_BATCH_SOLVER=ON"]

[packaging]
executable = "bin/StellarBatchSolver"
icon = "StellarBatchSolverInstallIcon.ico"
display_name = "StellarBatchSolver"
"#;

    #[test]
    fn test_parse_full_blueprint() {
        let desc = PackageDescriptor::from_toml(BATCH_SOLVER).unwrap();

        assert_eq!(desc.name, "stellarbatchsolver");
        assert_eq!(desc.default_version, "2.6");
        assert_eq!(desc.versions.len(), 2);
        assert_eq!(
            desc.source(&Version::new("2.6")).and_then(SourceLocation::source_dir),
            Some("stellarsolver-2.6")
        );
        assert!(matches!(
            desc.source(&Version::new("master")),
            Some(SourceLocation::Vcs { branch: None, .. })
        ));
        assert_eq!(
            desc.dependencies.get("libs/gsl"),
            Some(&VersionConstraint::Exact(Version::new("2.7")))
        );
        assert_eq!(
            desc.dependencies.get("virtual/base"),
            Some(&VersionConstraint::Default)
        );
        assert_eq!(desc.configure_args.len(), 2);

        let packaging = desc.packaging.unwrap();
        assert_eq!(
            packaging.target,
            PackagingTarget::AppPackage {
                display_name: "StellarBatchSolver".into()
            }
        );
    }

    #[test]
    fn test_packaging_without_display_name_is_generic() {
        let toml = r#"
[package]
name = "tester"
default_version = "Latest"

[versions.Latest]
git = "https://github.com/rlancaste/stellarsolver.git"

[packaging]
executable = "bin/StellarSolverTester"
"#;
        let desc = PackageDescriptor::from_toml(toml).unwrap();
        assert_eq!(desc.packaging.unwrap().target, PackagingTarget::Generic);
    }

    #[test]
    fn test_default_version_must_be_declared() {
        let toml = r#"
[package]
name = "stellarsolver"
default_version = "2.3"

[versions."2.6"]
url = "https://example.com/2.6.tar.gz"
"#;
        let err = PackageDescriptor::from_toml(toml).unwrap_err();
        assert!(matches!(err, ParseError::DefaultVersionMissing { .. }));
        assert!(err.to_string().contains("2.3"));
    }

    #[test]
    fn test_invalid_constraint_rejected() {
        let toml = r#"
[package]
name = "stellarsolver"
default_version = "2.6"

[versions."2.6"]
url = "https://example.com/2.6.tar.gz"

[dependencies]
"libs/gsl" = ""
"#;
        let err = PackageDescriptor::from_toml(toml).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidConstraint { ref dependency, .. } if dependency == "libs/gsl"
        ));
    }

    #[test]
    fn test_no_versions_rejected() {
        let toml = r#"
[package]
name = "stellarsolver"
default_version = "2.6"
"#;
        assert!(matches!(
            PackageDescriptor::from_toml(toml),
            Err(ParseError::NoVersions(_))
        ));
    }

    #[test]
    fn test_source_requires_url_or_git_unless_virtual() {
        let concrete = r#"
[package]
name = "stellarsolver"
default_version = "2.6"

[versions."2.6"]
"#;
        assert!(matches!(
            PackageDescriptor::from_toml(concrete),
            Err(ParseError::InvalidSource { .. })
        ));

        let virtual_pkg = r#"
[package]
name = "virtual/base"
default_version = "default"
virtual = true

[versions.default]
"#;
        let desc = PackageDescriptor::from_toml(virtual_pkg).unwrap();
        assert!(desc.is_virtual);
        assert_eq!(
            desc.source(&Version::new("default")),
            Some(&SourceLocation::Empty)
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let toml = r#"
[package]
name = "stellarsolver"
default_version = "2.6"
homepage = "https://example.com"

[versions."2.6"]
url = "https://example.com/2.6.tar.gz"
"#;
        assert!(matches!(
            PackageDescriptor::from_toml(toml),
            Err(ParseError::Toml(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(PackageDescriptor::from_toml("this is not valid toml {{{").is_err());
    }

    #[test]
    fn test_dependency_names_colliding_after_normalization_rejected() {
        let content = BATCH_SOLVER.replace(
            "\"libs/gsl\" = \"2.7\"",
            "\"libs/gsl\" = \"2.7\"\n\"Libs/GSL\" = \"2.6\"",
        );
        let err = PackageDescriptor::from_toml(&content).unwrap_err();
        match err {
            ParseError::DuplicateDependency {
                package,
                dependency,
            } => {
                assert_eq!(package, "stellarbatchsolver");
                assert_eq!(dependency, "libs/gsl");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_icon() {
        let mut desc = PackageDescriptor::from_toml(BATCH_SOLVER).unwrap();
        desc.resolve_icon(Path::new("/srv/blueprints/stellarbatchsolver"));
        let icon = desc.packaging.as_ref().and_then(|p| p.icon.clone()).unwrap();
        assert_eq!(
            Path::new(&icon),
            Path::new("/srv/blueprints/stellarbatchsolver/StellarBatchSolverInstallIcon.ico")
        );

        // Already absolute icons are left alone
        desc.resolve_icon(Path::new("/elsewhere"));
        let again = desc.packaging.as_ref().and_then(|p| p.icon.clone()).unwrap();
        assert_eq!(again, icon);
    }
}
