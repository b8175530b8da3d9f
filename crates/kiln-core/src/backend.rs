//! Build backend capability.
//!
//! A [`BuildBackend`] performs the three steps of building one package.
//! [`build_package`] is the single driver that runs them in order; the
//! executor never calls backend methods directly.

use async_trait::async_trait;
use kiln_schema::{PackageDescriptor, Version};

use crate::error::{BackendError, Step};
use crate::reporter::Reporter;
use crate::resolver::PlanEntry;

/// Configure, build and install one package.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Generate the build tree for `version` of `descriptor`.
    async fn configure(
        &self,
        descriptor: &PackageDescriptor,
        version: &Version,
    ) -> Result<(), BackendError>;

    /// Compile a configured package.
    async fn build(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError>;

    /// Install a built package into the prefix.
    async fn install(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError>;
}

/// Run `configure`, `build` and `install` for one plan entry, stopping at
/// the first failing step.
///
/// Virtual packages have nothing to build and succeed immediately.
///
/// # Errors
///
/// Returns the [`BackendError`] of the first step that fails.
pub async fn build_package(
    backend: &dyn BuildBackend,
    entry: &PlanEntry,
    reporter: &dyn Reporter,
) -> Result<(), BackendError> {
    let desc = &entry.descriptor;
    if desc.is_virtual {
        tracing::debug!(package = %desc.name, "virtual package, nothing to build");
        return Ok(());
    }

    reporter.step(&desc.name, &entry.version, Step::Configure);
    backend.configure(desc, &entry.version).await?;

    reporter.step(&desc.name, &entry.version, Step::Build);
    backend.build(desc).await?;

    reporter.step(&desc.name, &entry.version, Step::Install);
    backend.install(desc).await?;

    Ok(())
}

/// Backend that only logs what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBackend;

#[async_trait]
impl BuildBackend for DryRunBackend {
    async fn configure(
        &self,
        descriptor: &PackageDescriptor,
        version: &Version,
    ) -> Result<(), BackendError> {
        tracing::info!(
            package = %descriptor.name,
            %version,
            args = ?descriptor.configure_args,
            "dry-run: configure"
        );
        Ok(())
    }

    async fn build(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
        tracing::info!(package = %descriptor.name, "dry-run: build");
        Ok(())
    }

    async fn install(&self, descriptor: &PackageDescriptor) -> Result<(), BackendError> {
        tracing::info!(package = %descriptor.name, "dry-run: install");
        Ok(())
    }
}
