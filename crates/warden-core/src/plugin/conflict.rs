//! Conflict detection over a union dependency graph.
//!
//! A candidate set (the target plus every plugin planned for installation) is
//! checked against itself and against the already-installed plugins. Only
//! problems that touch the candidate set are reported; inconsistencies among
//! installed plugins alone are leftovers and ignored.

use std::collections::BTreeSet;

use warden_types::plugin::{DependencyEdge, PluginManifest};

use super::graph::{DependencyGraph, format_cycle};
use super::version;

/// Blocking conflicts and non-blocking warnings found in one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub blocking: BTreeSet<String>,
    pub warnings: BTreeSet<String>,
    /// Dependency ids named by a blocking constraint conflict.
    pub conflicted: BTreeSet<String>,
}

impl ConflictReport {
    fn record(&mut self, message: String, blocking: bool) {
        if blocking {
            self.blocking.insert(message);
        } else {
            self.warnings.insert(format!("{message} (optional, ignored)"));
        }
    }
}

/// Scan `graph` for conflicts touching `candidates`.
///
/// `required` holds the ids reachable from the target through required edges
/// only; an edge leaving a candidate outside that set is effectively optional.
pub fn detect(
    graph: &DependencyGraph,
    target: &PluginManifest,
    candidates: &BTreeSet<String>,
    required: &BTreeSet<String>,
) -> ConflictReport {
    let mut report = ConflictReport::default();

    let blocks = |edge: &DependencyEdge| {
        edge.required && (!candidates.contains(&edge.dependent) || required.contains(&edge.dependent))
    };

    for cycle in graph.required_cycles() {
        if !cycle.iter().any(|id| candidates.contains(id)) {
            continue;
        }
        let blocking = cycle
            .iter()
            .any(|id| candidates.contains(id) && required.contains(id));
        report.record(format_cycle(&cycle), blocking);
    }

    for dependency in graph.ids() {
        let edges = graph.edges_to(dependency);

        if dependency == target.id {
            for edge in edges.iter().filter(|e| e.dependent != target.id) {
                if !edge.constraint.matches(&target.version) {
                    report.record(
                        format!(
                            "{} requires {} but {} is being installed",
                            edge.dependent,
                            edge.target_label(),
                            target.label()
                        ),
                        blocks(edge),
                    );
                }
            }
            continue;
        }

        for (i, a) in edges.iter().enumerate() {
            for b in &edges[i + 1..] {
                let (a, b) = if candidates.contains(&a.dependent) {
                    (*a, *b)
                } else if candidates.contains(&b.dependent) {
                    (*b, *a)
                } else {
                    continue;
                };

                if version::compatible(&a.constraint, &b.constraint) {
                    continue;
                }

                let blocking = blocks(a) && blocks(b);
                if blocking {
                    report.conflicted.insert(dependency.to_string());
                }
                report.record(
                    format!(
                        "{} requires {} but {} requires {}",
                        a.dependent,
                        a.target_label(),
                        b.dependent,
                        b.target_label()
                    ),
                    blocking,
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::{Version, VersionReq};

    fn req(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reports_incompatible_constraints_against_installed() {
        let target = PluginManifest::new("plugin-x", Version::new(1, 0, 0))
            .with_dependency("lib-y", req("^2"), true);
        let installed = PluginManifest::new("lib-z", Version::new(1, 0, 0))
            .with_dependency("lib-y", req("^1"), true);
        let graph = DependencyGraph::from_manifests([&target, &installed]);

        let report = detect(&graph, &target, &ids(&["plugin-x"]), &ids(&["plugin-x", "lib-y"]));

        assert_eq!(
            report.blocking.iter().collect::<Vec<_>>(),
            vec!["plugin-x requires lib-y@^2 but lib-z requires lib-y@^1"]
        );
        assert!(report.conflicted.contains("lib-y"));
    }

    #[test]
    fn installed_only_conflicts_are_ignored() {
        let target = PluginManifest::new("fresh", Version::new(1, 0, 0));
        let one = PluginManifest::new("one", Version::new(1, 0, 0))
            .with_dependency("lib", req("^1"), true);
        let two = PluginManifest::new("two", Version::new(1, 0, 0))
            .with_dependency("lib", req("^2"), true);
        let graph = DependencyGraph::from_manifests([&target, &one, &two]);

        let report = detect(&graph, &target, &ids(&["fresh"]), &ids(&["fresh"]));
        assert_eq!(report, ConflictReport::default());
    }

    #[test]
    fn optional_edge_conflict_is_a_warning() {
        let target = PluginManifest::new("app", Version::new(1, 0, 0))
            .with_dependency("lib", req("^2"), false);
        let installed = PluginManifest::new("other", Version::new(1, 0, 0))
            .with_dependency("lib", req("^1"), true);
        let graph = DependencyGraph::from_manifests([&target, &installed]);

        let report = detect(&graph, &target, &ids(&["app"]), &ids(&["app"]));
        assert!(report.blocking.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.conflicted.is_empty());
    }

    #[test]
    fn upgrade_breaking_an_installed_dependent_is_blocking() {
        let target = PluginManifest::new("core", Version::new(2, 0, 0));
        let installed = PluginManifest::new("addon", Version::new(1, 0, 0))
            .with_dependency("core", req("^1"), true);
        let graph = DependencyGraph::from_manifests([&target, &installed]);

        let report = detect(&graph, &target, &ids(&["core"]), &ids(&["core"]));
        assert_eq!(
            report.blocking.iter().collect::<Vec<_>>(),
            vec!["addon requires core@^1 but core@2.0.0 is being installed"]
        );
    }

    #[test]
    fn required_cycle_through_candidate_blocks() {
        let a = PluginManifest::new("a", Version::new(1, 0, 0)).with_dependency("b", req("*"), true);
        let b = PluginManifest::new("b", Version::new(1, 0, 0)).with_dependency("a", req("*"), true);
        let graph = DependencyGraph::from_manifests([&a, &b]);

        let report = detect(&graph, &a, &ids(&["a", "b"]), &ids(&["a", "b"]));
        assert!(report.blocking.contains("Circular dependency: a -> b -> a"));
    }
}
