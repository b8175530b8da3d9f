//! Version selection and deterministic build ordering.
//!
//! Uses Kahn's algorithm with a min-heap keyed by package name, so among all
//! packages whose dependencies are already placed the lexicographically
//! smallest goes next. The same store and roots always give the same plan.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use kiln_schema::{PackageDescriptor, PackageName, Version, VersionConstraint};
use serde::Serialize;

use crate::error::ResolveError;
use crate::graph::{BuildGraph, PackageRequest};
use crate::store::DescriptorStore;

/// One package in a [`BuildPlan`], pinned to a version.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    /// Descriptor being built.
    pub descriptor: Arc<PackageDescriptor>,
    /// Resolved version.
    pub version: Version,
    /// Longest dependency chain below this entry; leaves are layer 0.
    pub layer: usize,
    /// Direct dependencies, ascending by name.
    pub dependencies: Vec<PackageName>,
}

impl PlanEntry {
    /// Package name.
    pub fn name(&self) -> &PackageName {
        &self.descriptor.name
    }
}

/// Topologically ordered, version-pinned build sequence.
///
/// Every entry's dependencies appear before it.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    entries: Vec<PlanEntry>,
    index: HashMap<PackageName, usize>,
}

#[derive(Serialize)]
struct PlanEntryView<'a> {
    name: &'a str,
    version: &'a str,
    layer: usize,
    dependencies: Vec<&'a str>,
    #[serde(rename = "virtual")]
    is_virtual: bool,
}

impl BuildPlan {
    /// Entries in build order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Iterate entries in build order.
    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of a package in the plan.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Look up the entry for a package.
    pub fn get(&self, name: &str) -> Option<&PlanEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    /// Number of layers (0 for an empty plan).
    pub fn layer_count(&self) -> usize {
        self.entries.iter().map(|e| e.layer + 1).max().unwrap_or(0)
    }

    /// For each entry, the positions of its direct dependents.
    pub fn dependents(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.entries.len()];
        for (i, entry) in self.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                if let Some(d) = self.position(dep) {
                    out[d].push(i);
                }
            }
        }
        out
    }

    /// Pretty-printed JSON array of the plan, in build order.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let view: Vec<PlanEntryView<'_>> = self
            .entries
            .iter()
            .map(|e| PlanEntryView {
                name: e.name().as_str(),
                version: e.version.as_str(),
                layer: e.layer,
                dependencies: e.dependencies.iter().map(PackageName::as_str).collect(),
                is_virtual: e.descriptor.is_virtual,
            })
            .collect();
        serde_json::to_string_pretty(&view)
    }
}

impl<'a> IntoIterator for &'a BuildPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Pin a version for every node and order the graph for building.
///
/// Roots use their requested version or their default. Every edge then
/// pins its target: `"default"` to the target's declared default, an exact
/// version to itself.
///
/// # Errors
///
/// Returns [`ResolveError::VersionNotFound`] if a root or edge names an
/// undeclared version, [`ResolveError::VersionConflict`] if one package is
/// pinned to two different versions, or [`ResolveError::Cycle`] if the
/// graph is not acyclic.
pub fn resolve(graph: &BuildGraph) -> Result<BuildPlan, ResolveError> {
    let versions = select_versions(graph)?;

    let mut in_degree: HashMap<&PackageName, usize> = HashMap::new();
    let mut adjacency: HashMap<&PackageName, Vec<&PackageName>> = HashMap::new();
    for desc in graph.nodes() {
        in_degree.insert(&desc.name, desc.dependencies.len());
        for dep in desc.dependencies.keys() {
            adjacency.entry(dep).or_default().push(&desc.name);
        }
    }

    let mut ready: BinaryHeap<Reverse<&PackageName>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| Reverse(*name))
        .collect();

    let mut plan = BuildPlan::default();
    while let Some(Reverse(name)) = ready.pop() {
        let Some(descriptor) = graph.node(name).cloned() else {
            continue;
        };
        let dependencies: Vec<PackageName> = descriptor.dependencies.keys().cloned().collect();
        let layer = dependencies
            .iter()
            .filter_map(|d| plan.get(d))
            .map(|e| e.layer + 1)
            .max()
            .unwrap_or(0);
        let version = versions
            .get(name)
            .cloned()
            .unwrap_or_else(|| descriptor.default_version.clone());

        plan.index.insert(name.clone(), plan.entries.len());
        plan.entries.push(PlanEntry {
            descriptor,
            version,
            layer,
            dependencies,
        });

        for dependent in adjacency.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*dependent));
                }
            }
        }
    }

    if plan.len() < graph.len() {
        let cycle: Vec<PackageName> = graph
            .nodes()
            .filter(|d| plan.position(&d.name).is_none())
            .map(|d| d.name.clone())
            .collect();
        return Err(ResolveError::Cycle { cycle });
    }

    tracing::debug!(
        packages = plan.len(),
        layers = plan.layer_count(),
        "resolved build plan"
    );
    Ok(plan)
}

/// Build the graph for `roots` and resolve it in one step.
///
/// # Errors
///
/// Any error of [`BuildGraph::build`] or [`resolve`].
pub fn plan(store: &DescriptorStore, roots: &[PackageRequest]) -> Result<BuildPlan, ResolveError> {
    let graph = BuildGraph::build(store, roots)?;
    resolve(&graph)
}

fn select_versions(graph: &BuildGraph) -> Result<HashMap<PackageName, Version>, ResolveError> {
    let mut selected: HashMap<PackageName, Version> = HashMap::new();

    let mut pin = |package: &PackageName, version: Version| -> Result<(), ResolveError> {
        match selected.get(package) {
            Some(existing) if *existing != version => Err(ResolveError::VersionConflict {
                package: package.clone(),
                first: existing.clone(),
                second: version,
            }),
            Some(_) => Ok(()),
            None => {
                selected.insert(package.clone(), version);
                Ok(())
            }
        }
    };

    for root in graph.roots() {
        let Some(desc) = graph.node(&root.name) else {
            return Err(ResolveError::NotFound(root.name.clone()));
        };
        let version = match &root.version {
            Some(v) if desc.has_version(v) => v.clone(),
            Some(v) => {
                return Err(ResolveError::VersionNotFound {
                    package: desc.name.clone(),
                    version: v.clone(),
                    required_by: None,
                });
            }
            None => desc.default_version.clone(),
        };
        pin(&desc.name, version)?;
    }

    for edge in graph.edges() {
        let Some(target) = graph.node(&edge.to) else {
            return Err(ResolveError::MissingDependency {
                package: edge.from.clone(),
                dependency: edge.to.clone(),
            });
        };
        let version = match &edge.constraint {
            VersionConstraint::Default => target.default_version.clone(),
            VersionConstraint::Exact(v) if target.has_version(v) => v.clone(),
            VersionConstraint::Exact(v) => {
                return Err(ResolveError::VersionNotFound {
                    package: target.name.clone(),
                    version: v.clone(),
                    required_by: Some(edge.from.clone()),
                });
            }
        };
        pin(&target.name, version)?;
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{blueprint, store_of};

    fn order(plan: &BuildPlan) -> Vec<&str> {
        plan.iter().map(|e| e.name().as_str()).collect()
    }

    fn plan_for(store: &DescriptorStore, roots: &[&str]) -> Result<BuildPlan, ResolveError> {
        let roots: Vec<PackageRequest> = roots.iter().map(|r| r.parse().unwrap()).collect();
        plan(store, &roots)
    }

    #[test]
    fn test_simple_resolution() {
        let store = store_of(&[("a", &["b"]), ("b", &[])]);
        let plan = plan_for(&store, &["a"]).unwrap();
        assert_eq!(order(&plan), vec!["b", "a"]);
    }

    #[test]
    fn test_shared_dependency_ties_broken_by_name() {
        let store = store_of(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        let plan = plan_for(&store, &["c", "b"]).unwrap();
        assert_eq!(order(&plan), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_complex_resolution() {
        let store = store_of(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        let plan = plan_for(&store, &["a"]).unwrap();

        for entry in &plan {
            let pos = plan.position(entry.name()).unwrap();
            for dep in &entry.dependencies {
                assert!(plan.position(dep).unwrap() < pos, "{dep} must precede {}", entry.name());
            }
        }
        assert_eq!(order(&plan), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_min_heap_prefers_smallest_ready_name() {
        // z has no deps, so it is ready immediately but still loses to "b"
        // once "a" has been placed.
        let store = store_of(&[("root", &["b", "z"]), ("b", &["a"]), ("a", &[]), ("z", &[])]);
        let plan = plan_for(&store, &["root"]).unwrap();
        assert_eq!(order(&plan), vec!["a", "b", "z", "root"]);
    }

    #[test]
    fn test_layers() {
        let store = store_of(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &[]), ("d", &[])]);
        let plan = plan_for(&store, &["a"]).unwrap();

        assert_eq!(plan.layer_count(), 3);
        assert_eq!(plan.get("c").unwrap().layer, 0);
        assert_eq!(plan.get("d").unwrap().layer, 0);
        assert_eq!(plan.get("b").unwrap().layer, 1);
        assert_eq!(plan.get("a").unwrap().layer, 2);
    }

    #[test]
    fn test_deep_build_chain() {
        let store = store_of(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["d"]),
            ("d", &["e"]),
            ("e", &[]),
        ]);
        let plan = plan_for(&store, &["a"]).unwrap();
        assert_eq!(order(&plan), vec!["e", "d", "c", "b", "a"]);
        assert_eq!(plan.get("a").unwrap().layer, 4);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let store = store_of(&[
            ("app", &["libs/qt/qtbase", "libs/gsl", "virtual/base"]),
            ("libs/gsl", &["virtual/base"]),
            ("libs/qt/qtbase", &["virtual/base"]),
            ("virtual/base", &[]),
        ]);
        let first = plan_for(&store, &["app"]).unwrap().to_json().unwrap();
        for _ in 0..10 {
            assert_eq!(plan_for(&store, &["app"]).unwrap().to_json().unwrap(), first);
        }
    }

    #[test]
    fn test_cycle_detection() {
        let store = store_of(&[("a", &["b"]), ("b", &["a"])]);
        let err = plan_for(&store, &["a"]).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_default_constraint_follows_current_default() {
        let mut store = DescriptorStore::default();
        store
            .load_str("gsl", &blueprint("libs/gsl", &["2.6", "2.7"], "2.6", &[]))
            .unwrap();
        store
            .load_str("app", &blueprint("app", &["1.0"], "1.0", &[("libs/gsl", "default")]))
            .unwrap();
        assert_eq!(plan_for(&store, &["app"]).unwrap().get("libs/gsl").unwrap().version, "2.6");

        store
            .load_str("gsl", &blueprint("libs/gsl", &["2.6", "2.7"], "2.7", &[]))
            .unwrap();
        assert_eq!(plan_for(&store, &["app"]).unwrap().get("libs/gsl").unwrap().version, "2.7");
    }

    #[test]
    fn test_exact_constraint() {
        let mut store = DescriptorStore::default();
        store
            .load_str("gsl", &blueprint("libs/gsl", &["2.6", "2.7"], "2.7", &[]))
            .unwrap();
        store
            .load_str("app", &blueprint("app", &["1.0"], "1.0", &[("libs/gsl", "2.6")]))
            .unwrap();
        assert_eq!(plan_for(&store, &["app"]).unwrap().get("libs/gsl").unwrap().version, "2.6");
    }

    #[test]
    fn test_exact_constraint_missing_version() {
        let mut store = DescriptorStore::default();
        store
            .load_str("gsl", &blueprint("libs/gsl", &["2.7"], "2.7", &[]))
            .unwrap();
        store
            .load_str("app", &blueprint("app", &["1.0"], "1.0", &[("libs/gsl", "1.16")]))
            .unwrap();

        match plan_for(&store, &["app"]).unwrap_err() {
            ResolveError::VersionNotFound {
                package,
                version,
                required_by,
            } => {
                assert_eq!(package, "libs/gsl");
                assert_eq!(version, "1.16");
                assert_eq!(required_by, Some(PackageName::new("app")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_root_version_request() {
        let mut store = DescriptorStore::default();
        store
            .load_str("s", &blueprint("stellarsolver", &["2.3", "2.6"], "2.6", &[]))
            .unwrap();

        let plan = plan_for(&store, &["stellarsolver@2.3"]).unwrap();
        assert_eq!(plan.get("stellarsolver").unwrap().version, "2.3");

        assert!(matches!(
            plan_for(&store, &["stellarsolver@9.9"]),
            Err(ResolveError::VersionNotFound { required_by: None, .. })
        ));
    }

    #[test]
    fn test_conflicting_pins() {
        let mut store = DescriptorStore::default();
        store
            .load_str("gsl", &blueprint("libs/gsl", &["2.6", "2.7"], "2.7", &[]))
            .unwrap();
        store
            .load_str("a", &blueprint("a", &["1.0"], "1.0", &[("libs/gsl", "2.6")]))
            .unwrap();
        store
            .load_str("b", &blueprint("b", &["1.0"], "1.0", &[("libs/gsl", "default")]))
            .unwrap();

        assert!(matches!(
            plan_for(&store, &["a", "b"]),
            Err(ResolveError::VersionConflict { package, .. }) if package == "libs/gsl"
        ));
    }

    #[test]
    fn test_plan_json() {
        let store = store_of(&[("a", &["b"]), ("b", &[])]);
        let json = plan_for(&store, &["a"]).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["name"], "b");
        assert_eq!(value[1]["name"], "a");
        assert_eq!(value[1]["version"], "1.0");
        assert_eq!(value[1]["layer"], 1);
        assert_eq!(value[1]["dependencies"][0], "b");
        assert_eq!(value[1]["virtual"], false);
    }

    #[test]
    fn test_dependents_positions() {
        let store = store_of(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        let plan = plan_for(&store, &["c"]).unwrap();
        let dependents = plan.dependents();
        assert_eq!(dependents[0], vec![1, 2]);
        assert_eq!(dependents[1], vec![2]);
        assert!(dependents[2].is_empty());
    }
}
