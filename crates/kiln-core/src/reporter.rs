//! Reporter trait for dependency injection
//!
//! This trait allows the executor and backends to report progress without
//! being coupled to a specific terminal implementation.

use kiln_schema::{PackageName, Version};

use crate::error::Step;
use crate::executor::Summary;
use crate::resolver::BuildPlan;

/// Sink for build progress and user-facing messages.
pub trait Reporter: Send + Sync {
    /// A plan has been resolved and is about to run.
    fn plan_ready(&self, plan: &BuildPlan);

    /// A package has entered one of its backend steps.
    fn step(&self, name: &PackageName, version: &Version, step: Step);

    /// Marks a package as successfully built.
    fn done(&self, name: &PackageName, version: &Version, elapsed_secs: f64);

    /// Marks a package build as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Marks a package as skipped without being started.
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display the final counts of an execution.
    fn summary(&self, summary: &Summary, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn plan_ready(&self, plan: &BuildPlan) {
        (**self).plan_ready(plan)
    }
    fn step(&self, name: &PackageName, version: &Version, step: Step) {
        (**self).step(name, version, step)
    }
    fn done(&self, name: &PackageName, version: &Version, elapsed_secs: f64) {
        (**self).done(name, version, elapsed_secs)
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason)
    }
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).skipped(name, version, reason)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
    fn summary(&self, summary: &Summary, elapsed_secs: f64) {
        (**self).summary(summary, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., checks, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn plan_ready(&self, _: &BuildPlan) {}
    fn step(&self, _: &PackageName, _: &Version, _: Step) {}
    fn done(&self, _: &PackageName, _: &Version, _: f64) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn skipped(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &Summary, _: f64) {}
}
