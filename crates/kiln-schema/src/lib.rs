//! Shared types and the blueprint format for kiln.
//!
//! Everything in here is plain data: names, versions, constraints and the
//! validated [`PackageDescriptor`] produced from a TOML blueprint. Loading,
//! resolution and execution live in `kiln-core`.

pub mod descriptor;
pub mod types;

// Re-exports
pub use descriptor::{
    PackageDescriptor, PackagingMetadata, PackagingTarget, ParseError, SourceLocation,
};
pub use types::*;

/// File extension of blueprint files.
pub const BLUEPRINT_EXTENSION: &str = "toml";
