//! In-memory descriptor registry.
//!
//! A [`DescriptorStore`] is an explicit value handed to the graph builder
//! and resolver; there is no process-wide package table. Each descriptor is
//! registered under the *source* it came from (a file path or any caller
//! supplied identifier) so that reloading a source replaces its own entry,
//! while a second source claiming the same package name goes through the
//! configured [`DuplicatePolicy`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use kiln_schema::{BLUEPRINT_EXTENSION, PackageDescriptor, PackageName};

use crate::config::DuplicatePolicy;
use crate::error::ResolveError;

#[derive(Debug, Clone)]
struct Registered {
    descriptor: Arc<PackageDescriptor>,
    source_id: String,
}

/// Registry of loaded package descriptors, keyed by name.
#[derive(Debug, Default)]
pub struct DescriptorStore {
    descriptors: BTreeMap<PackageName, Registered>,
    sources: HashMap<String, PackageName>,
    policy: DuplicatePolicy,
}

impl DescriptorStore {
    /// Create an empty store with the given duplicate policy.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Parse `content` and register the descriptor under `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Parse`] if the blueprint is invalid, or
    /// [`ResolveError::DuplicateDescriptor`] if another source already
    /// declares the package and the policy is [`DuplicatePolicy::Error`].
    pub fn load_str(
        &mut self,
        source_id: &str,
        content: &str,
    ) -> Result<Arc<PackageDescriptor>, ResolveError> {
        let descriptor = PackageDescriptor::from_toml(content)
            .map_err(|e| ResolveError::parse(source_id, e))?;
        self.insert(source_id, descriptor)
    }

    /// Load a single blueprint file. The path is the source id.
    ///
    /// A relative packaging icon is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Io`] if the file cannot be read, otherwise
    /// the errors of [`DescriptorStore::load_str`].
    pub fn load_file(&mut self, path: &Path) -> Result<Arc<PackageDescriptor>, ResolveError> {
        let content = std::fs::read_to_string(path).map_err(|error| ResolveError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let source_id = path.display().to_string();
        let mut descriptor = PackageDescriptor::from_toml(&content)
            .map_err(|e| ResolveError::parse(source_id.as_str(), e))?;
        if let Some(dir) = path.parent() {
            let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
            descriptor.resolve_icon(&dir);
        }
        self.insert(&source_id, descriptor)
    }

    /// Load every `*.toml` blueprint below `dir`, in sorted path order.
    ///
    /// Hidden files and anything below a hidden directory are ignored.
    /// Returns the number of files loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Io`] if `dir` is not a readable directory,
    /// or the first error raised by [`DescriptorStore::load_file`].
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, ResolveError> {
        if !dir.is_dir() {
            return Err(ResolveError::Io {
                path: dir.to_path_buf(),
                error: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let pattern = format!(
            "{}/**/*.{BLUEPRINT_EXTENSION}",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let options = glob::MatchOptions {
            require_literal_leading_dot: true,
            ..glob::MatchOptions::new()
        };
        let entries = glob::glob_with(&pattern, options).map_err(|e| ResolveError::Io {
            path: dir.to_path_buf(),
            error: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ResolveError::Io {
                path: e.path().to_path_buf(),
                error: std::io::Error::new(e.error().kind(), e.error().to_string()),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        for path in &files {
            self.load_file(path)?;
        }

        tracing::debug!(dir = %dir.display(), count = files.len(), "loaded blueprints");
        Ok(files.len())
    }

    /// Register an already validated descriptor under `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateDescriptor`] if a different source
    /// already declares the package and the policy is
    /// [`DuplicatePolicy::Error`].
    pub fn insert(
        &mut self,
        source_id: &str,
        descriptor: PackageDescriptor,
    ) -> Result<Arc<PackageDescriptor>, ResolveError> {
        let name = descriptor.name.clone();

        if let Some(existing) = self.descriptors.get(&name) {
            if existing.source_id != source_id {
                match self.policy {
                    DuplicatePolicy::Error => {
                        return Err(ResolveError::DuplicateDescriptor {
                            name,
                            first: existing.source_id.clone(),
                            second: source_id.to_string(),
                        });
                    }
                    DuplicatePolicy::LastWins => {
                        tracing::warn!(
                            package = %name,
                            replaced = %existing.source_id,
                            by = %source_id,
                            "duplicate descriptor, keeping the last one loaded"
                        );
                        let previous = existing.source_id.clone();
                        self.sources.remove(&previous);
                    }
                }
            }
        }

        // A source that used to declare a different name no longer does.
        if let Some(previous) = self.sources.get(source_id) {
            if *previous != name {
                let previous = previous.clone();
                self.descriptors.remove(&previous);
            }
        }

        let descriptor = Arc::new(descriptor);
        self.sources.insert(source_id.to_string(), name.clone());
        self.descriptors.insert(
            name,
            Registered {
                descriptor: descriptor.clone(),
                source_id: source_id.to_string(),
            },
        );
        Ok(descriptor)
    }

    /// Look up a descriptor by name.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if no descriptor has that name.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<PackageDescriptor>, ResolveError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(PackageName::new(name)))
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&Arc<PackageDescriptor>> {
        self.descriptors
            .get(PackageName::new(name).as_str())
            .map(|r| &r.descriptor)
    }

    /// Returns `true` if a descriptor with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Source a package was loaded from.
    pub fn source_of(&self, name: &str) -> Option<&str> {
        self.descriptors
            .get(PackageName::new(name).as_str())
            .map(|r| r.source_id.as_str())
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.descriptors.keys()
    }

    /// Descriptors in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageDescriptor>> {
        self.descriptors.values().map(|r| &r.descriptor)
    }
}
