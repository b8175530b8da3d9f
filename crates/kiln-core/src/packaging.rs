//! Packaging defines handed to installers once a package is installed.

use std::collections::BTreeMap;

use kiln_schema::{PackageDescriptor, PackagingTarget, Version};
use serde::Serialize;

/// Key/value defines for the packager targeted by `descriptor`.
///
/// Empty for packages without packaging metadata. `display_name` is only
/// present for [`PackagingTarget::AppPackage`].
pub fn defines(descriptor: &PackageDescriptor) -> BTreeMap<&'static str, String> {
    let mut out = BTreeMap::new();
    let Some(packaging) = &descriptor.packaging else {
        return out;
    };

    out.insert("executable", packaging.executable.clone());
    if let Some(icon) = &packaging.icon {
        out.insert("icon", icon.clone());
    }
    match &packaging.target {
        PackagingTarget::AppPackage { display_name } => {
            out.insert("display_name", display_name.clone());
        }
        PackagingTarget::Generic => {}
    }
    out
}

/// Contents of the `package.json` written next to an installed build.
#[derive(Debug, Serialize)]
pub struct PackageManifest<'a> {
    /// Package name.
    pub name: &'a str,
    /// Version that was configured, when known.
    pub version: Option<&'a str>,
    /// One-line summary.
    pub description: &'a str,
    /// Packager defines.
    pub defines: BTreeMap<&'static str, String>,
}

impl<'a> PackageManifest<'a> {
    /// Collect the manifest for `descriptor`.
    pub fn new(descriptor: &'a PackageDescriptor, version: Option<&'a Version>) -> Self {
        Self {
            name: descriptor.name.as_str(),
            version: version.map(Version::as_str),
            description: &descriptor.description,
            defines: defines(descriptor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(packaging: &str) -> PackageDescriptor {
        PackageDescriptor::from_toml(&format!(
            r#"
[package]
name = "stellarsolvertester"
description = "StellarSolver tester"
default_version = "Latest"

[versions.Latest]
git = "https://github.com/rlancaste/stellarsolver.git"

{packaging}
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_app_package_gets_display_name() {
        let desc = descriptor(
            r#"[packaging]
executable = "bin/StellarSolverTester"
icon = "StellarSolverInstallIcon.ico"
display_name = "StellarSolverTester""#,
        );
        let defines = defines(&desc);
        assert_eq!(defines["executable"], "bin/StellarSolverTester");
        assert_eq!(defines["icon"], "StellarSolverInstallIcon.ico");
        assert_eq!(defines["display_name"], "StellarSolverTester");
    }

    #[test]
    fn test_generic_target_has_no_display_name() {
        let desc = descriptor(
            r#"[packaging]
executable = "bin/StellarSolverTester""#,
        );
        let defines = defines(&desc);
        assert_eq!(defines.len(), 1);
        assert!(!defines.contains_key("display_name"));
        assert!(!defines.contains_key("icon"));
    }

    #[test]
    fn test_no_packaging_metadata() {
        assert!(defines(&descriptor("")).is_empty());
    }

    #[test]
    fn test_manifest_serializes() {
        let desc = descriptor(
            r#"[packaging]
executable = "bin/StellarSolverTester""#,
        );
        let version = Version::new("Latest");
        let json = serde_json::to_value(PackageManifest::new(&desc, Some(&version))).unwrap();
        assert_eq!(json["name"], "stellarsolvertester");
        assert_eq!(json["version"], "Latest");
        assert_eq!(json["defines"]["executable"], "bin/StellarSolverTester");
    }
}
