//! Dependency graph construction and cycle detection.
//!
//! [`BuildGraph::build`] walks the store breadth-first from the requested
//! roots, then runs a three-color depth-first pass to reject cycles before
//! anything downstream sees the graph.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use kiln_schema::{PackageDescriptor, PackageName, Version, VersionConstraint};

use crate::error::ResolveError;
use crate::store::DescriptorStore;

/// A root package named on the command line (`name` or `name@version`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Requested package.
    pub name: PackageName,
    /// Explicit version; the package default when `None`.
    pub version: Option<Version>,
}

impl PackageRequest {
    /// Request the default version of `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: PackageName::new(name),
            version: None,
        }
    }

    /// Request a specific version of `name`.
    pub fn with_version(name: &str, version: &str) -> Self {
        Self {
            name: PackageName::new(name),
            version: Some(Version::new(version)),
        }
    }
}

impl FromStr for PackageRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s, None),
        };
        if name.trim().is_empty() {
            return Err(format!("invalid package '{s}': empty name"));
        }
        match version {
            Some(v) if v.trim().is_empty() => {
                Err(format!("invalid package '{s}': empty version after '@'"))
            }
            Some(v) => Ok(Self::with_version(name, v)),
            None => Ok(Self::new(name)),
        }
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// `from` depends on `to` under `constraint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Dependent package.
    pub from: PackageName,
    /// Dependency.
    pub to: PackageName,
    /// Version the dependent requires.
    pub constraint: VersionConstraint,
}

/// Acyclic dependency graph reachable from a set of roots.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    nodes: BTreeMap<PackageName, Arc<PackageDescriptor>>,
    edges: Vec<DependencyEdge>,
    roots: Vec<PackageRequest>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Visiting,
    Done,
}

impl BuildGraph {
    /// Collect every package reachable from `roots` and verify there is no cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] for an unknown root,
    /// [`ResolveError::MissingDependency`] for a dependency that is not in
    /// the store, or [`ResolveError::Cycle`] if the graph has a cycle.
    pub fn build(store: &DescriptorStore, roots: &[PackageRequest]) -> Result<Self, ResolveError> {
        let mut nodes = BTreeMap::new();
        let mut edges = Vec::new();
        let mut queue = VecDeque::new();

        for root in roots {
            let desc = store.get_by_name(&root.name)?;
            if !nodes.contains_key(&desc.name) {
                nodes.insert(desc.name.clone(), desc.clone());
                queue.push_back(desc);
            }
        }

        while let Some(desc) = queue.pop_front() {
            for (dep, constraint) in &desc.dependencies {
                let target =
                    store
                        .get(dep)
                        .cloned()
                        .ok_or_else(|| ResolveError::MissingDependency {
                            package: desc.name.clone(),
                            dependency: dep.clone(),
                        })?;

                edges.push(DependencyEdge {
                    from: desc.name.clone(),
                    to: target.name.clone(),
                    constraint: constraint.clone(),
                });

                if !nodes.contains_key(&target.name) {
                    nodes.insert(target.name.clone(), target.clone());
                    queue.push_back(target);
                }
            }
        }

        let graph = Self {
            nodes,
            edges,
            roots: roots.to_vec(),
        };
        graph.check_acyclic()?;

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "built dependency graph"
        );
        Ok(graph)
    }

    /// Nodes in ascending name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PackageDescriptor>> {
        self.nodes.values()
    }

    /// Look up a node.
    pub fn node(&self, name: &str) -> Option<&Arc<PackageDescriptor>> {
        self.nodes.get(name)
    }

    /// All edges, grouped by dependent in discovery order.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Requested roots, in the order given.
    pub fn roots(&self) -> &[PackageRequest] {
        &self.roots
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_acyclic(&self) -> Result<(), ResolveError> {
        let mut color: HashMap<&PackageName, Color> = HashMap::new();
        let mut stack: Vec<&PackageName> = Vec::new();

        for name in self.nodes.keys() {
            if !color.contains_key(name) {
                self.visit(name, &mut color, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a PackageName,
        color: &mut HashMap<&'a PackageName, Color>,
        stack: &mut Vec<&'a PackageName>,
    ) -> Result<(), ResolveError> {
        color.insert(name, Color::Visiting);
        stack.push(name);

        if let Some(desc) = self.nodes.get(name) {
            for dep in desc.dependencies.keys() {
                match color.get(dep) {
                    Some(Color::Visiting) => {
                        let start = stack.iter().position(|n| *n == dep).unwrap_or(0);
                        let cycle = stack[start..].iter().map(|n| (*n).clone()).collect();
                        return Err(ResolveError::Cycle { cycle });
                    }
                    Some(Color::Done) => {}
                    None => self.visit(dep, color, stack)?,
                }
            }
        }

        stack.pop();
        color.insert(name, Color::Done);
        Ok(())
    }

    /// Names of every package that depends on `name`, directly or not.
    pub fn dependents_of(&self, name: &str) -> HashSet<&PackageName> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                if edge.to == current && found.insert(&edge.from) {
                    queue.push_back(edge.from.as_str());
                }
            }
        }
        found
    }
}
