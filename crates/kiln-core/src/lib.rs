pub mod backend;
pub mod cmake;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod packaging;
pub mod paths;
pub mod resolver;
pub mod store;

pub mod reporter;

pub use backend::{BuildBackend, DryRunBackend, build_package};
pub use cmake::CmakeBackend;
pub use config::{CmakeConfig, Config, ConfigError, DuplicatePolicy};
pub use error::{BackendError, ResolveError, Step};
pub use executor::{
    BuildReport, BuildResult, BuildStatus, ExecuteOptions, Executor, Progress, Summary, execute,
};
pub use graph::{BuildGraph, DependencyEdge, PackageRequest};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{BuildPlan, PlanEntry, plan, resolve};
pub use store::DescriptorStore;

// Re-export tokio-util's token so callers don't need the dependency
pub use tokio_util::sync::CancellationToken;
