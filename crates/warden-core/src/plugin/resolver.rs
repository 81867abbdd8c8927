//! Dependency resolution for a target manifest.
//!
//! [`resolve`] is a pure function of the target, the user's installed
//! manifests and a registry snapshot. Versions for dependencies that are not
//! installed are chosen by a fixed-point walk: pick the highest published
//! version satisfying every constraint seen so far, follow its edges, and
//! repeat until the picks stop changing. Installed plugins are never
//! displaced; an installed version that fails a constraint is reported as
//! missing and must be upgraded explicitly.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use semver::{Version, VersionReq};
use warden_types::plugin::{DependencyEdge, PluginManifest};
use warden_types::resolution::{Resolution, ResolvedDependency};

use super::conflict;
use super::graph::DependencyGraph;
use super::registry::RegistryView;
use super::version;

/// Edges and planned manifests reachable from the target for one set of
/// version picks.
struct Walk<'a> {
    /// Incoming edges by dependency id, from the target and planned plugins.
    edges: BTreeMap<String, Vec<DependencyEdge>>,
    planned: BTreeMap<String, &'a PluginManifest>,
    /// Ids reachable from the target through required edges only.
    required: BTreeSet<String>,
}

impl<'a> Walk<'a> {
    fn run(
        target: &'a PluginManifest,
        installed: &BTreeMap<&str, &'a PluginManifest>,
        registry: &'a RegistryView,
        picks: &BTreeMap<String, Version>,
    ) -> Self {
        let mut edges: BTreeMap<String, Vec<DependencyEdge>> = BTreeMap::new();
        let mut planned: BTreeMap<String, &'a PluginManifest> = BTreeMap::new();

        let mut queue = VecDeque::from([target]);
        while let Some(manifest) = queue.pop_front() {
            for edge in manifest.edges() {
                let dependency = edge.dependency.clone();
                edges.entry(dependency.clone()).or_default().push(edge);

                if dependency == target.id || installed.contains_key(dependency.as_str()) {
                    continue;
                }
                let Some(picked) = picks
                    .get(&dependency)
                    .and_then(|v| registry.get(&dependency, v))
                else {
                    continue;
                };
                if planned.insert(dependency, picked).is_none() {
                    queue.push_back(picked);
                }
            }
        }

        let mut required = BTreeSet::from([target.id.clone()]);
        let mut stack = vec![target];
        while let Some(manifest) = stack.pop() {
            for dep in manifest.dependencies.iter().filter(|d| d.required) {
                if required.insert(dep.plugin_id.clone()) {
                    if let Some(next) = planned.get(&dep.plugin_id).copied() {
                        stack.push(next);
                    }
                }
            }
        }

        Self {
            edges,
            planned,
            required,
        }
    }

    fn is_effectively_required(&self, edge: &DependencyEdge) -> bool {
        edge.required && self.required.contains(&edge.dependent)
    }

    /// Highest published version for every reachable, not-installed
    /// dependency. Falls back to honoring only the blocking constraints when
    /// no version satisfies all of them.
    fn choose(
        &self,
        target: &PluginManifest,
        installed: &BTreeMap<&str, &PluginManifest>,
        registry: &RegistryView,
    ) -> BTreeMap<String, Version> {
        let mut picks = BTreeMap::new();
        for (dependency, edges) in &self.edges {
            if *dependency == target.id || installed.contains_key(dependency.as_str()) {
                continue;
            }

            let all: Vec<&VersionReq> = edges.iter().map(|e| &e.constraint).collect();
            let blocking: Vec<&VersionReq> = edges
                .iter()
                .filter(|e| self.is_effectively_required(e))
                .map(|e| &e.constraint)
                .collect();

            let pick = version::highest_matching(&all, registry.versions(dependency)).or_else(|| {
                if blocking.is_empty() || blocking.len() == all.len() {
                    None
                } else {
                    version::highest_matching(&blocking, registry.versions(dependency))
                }
            });

            if let Some(v) = pick {
                picks.insert(dependency.clone(), v.clone());
            }
        }
        picks
    }
}

/// Resolve `target` against the user's installed manifests.
///
/// An installed manifest with the target's own id is the version being
/// replaced and is left out of the installed set.
pub fn resolve(
    target: &PluginManifest,
    installed: &[PluginManifest],
    registry: &RegistryView,
) -> Resolution {
    let installed: BTreeMap<&str, &PluginManifest> = installed
        .iter()
        .filter(|m| m.id != target.id)
        .map(|m| (m.id.as_str(), m))
        .collect();

    let mut picks = BTreeMap::new();
    let mut walk = Walk::run(target, &installed, registry, &picks);
    // Each pass either reaches one level deeper or revises a pick.
    for _ in 0..registry.id_count() + 2 {
        let next = walk.choose(target, &installed, registry);
        if next == picks {
            break;
        }
        picks = next;
        walk = Walk::run(target, &installed, registry, &picks);
    }

    let graph = DependencyGraph::from_manifests(
        std::iter::once(target)
            .chain(installed.values().copied())
            .chain(walk.planned.values().copied()),
    );
    let candidates: BTreeSet<String> = std::iter::once(target.id.clone())
        .chain(walk.planned.keys().cloned())
        .collect();
    let report = conflict::detect(&graph, target, &candidates, &walk.required);

    let mut dependencies: BTreeMap<String, ResolvedDependency> = BTreeMap::new();
    let mut missing = BTreeSet::new();
    let mut warnings = report.warnings;

    for (dependency, edges) in &walk.edges {
        if *dependency == target.id {
            continue;
        }

        let resolved = match installed.get(dependency.as_str()) {
            Some(m) => Some((&m.version, true)),
            None => walk.planned.get(dependency).map(|m| (&m.version, false)),
        };

        for edge in edges {
            let blocking = walk.is_effectively_required(edge);
            match resolved {
                Some((v, is_installed)) if edge.constraint.matches(v) => {
                    dependencies
                        .entry(dependency.clone())
                        .or_insert_with(|| ResolvedDependency {
                            plugin_id: dependency.clone(),
                            version: v.clone(),
                            installed: is_installed,
                            required: walk.required.contains(dependency),
                        });
                }
                _ if report.conflicted.contains(dependency) => {}
                _ if blocking => {
                    missing.insert(edge.target_label());
                }
                Some((v, true)) => {
                    warnings.insert(format!(
                        "optional dependency {} not satisfied by installed {}@{}",
                        edge.target_label(),
                        dependency,
                        v
                    ));
                }
                _ => {
                    warnings.insert(format!(
                        "optional dependency {} is unavailable",
                        edge.target_label()
                    ));
                }
            }
        }
    }

    let planned_ids: BTreeSet<String> = dependencies
        .values()
        .filter(|d| !d.installed)
        .map(|d| d.plugin_id.clone())
        .collect();
    let install_order = graph.install_order(&planned_ids);

    let conflicts: Vec<String> = report.blocking.into_iter().collect();
    let missing: Vec<String> = missing.into_iter().collect();
    let can_install = conflicts.is_empty() && missing.is_empty();

    Resolution {
        plugin_id: target.id.clone(),
        version: target.version.clone(),
        dependencies: dependencies.into_values().collect(),
        conflicts,
        missing,
        warnings: warnings.into_iter().collect(),
        install_order,
        can_install,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn req(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    fn plugin(id: &str, version: &str) -> PluginManifest {
        PluginManifest::new(id, v(version))
    }

    #[test]
    fn missing_when_installed_version_too_old() {
        let a = plugin("a", "1.0.0").with_dependency("b", req("^2.0.0"), true);
        let installed = vec![plugin("b", "1.5.0")];
        let registry = RegistryView::from_manifests([plugin("b", "1.5.0"), plugin("b", "2.1.0")]);

        let resolution = resolve(&a, &installed, &registry);
        assert_eq!(resolution.missing, vec!["b@^2.0.0"]);
        assert!(!resolution.can_install);

        let upgraded = vec![plugin("b", "2.1.0")];
        let resolution = resolve(&a, &upgraded, &registry);
        assert!(resolution.missing.is_empty());
        assert!(resolution.can_install);
        assert_eq!(
            resolution.dependencies,
            vec![ResolvedDependency {
                plugin_id: "b".to_string(),
                version: v("2.1.0"),
                installed: true,
                required: true,
            }]
        );
    }

    #[test]
    fn plans_highest_registry_version_transitively() {
        let app = plugin("app", "1.0.0")
            .with_dependency("http", req("^1"), true)
            .with_dependency("log", req(">=0.3, <0.5"), true);
        let registry = RegistryView::from_manifests([
            plugin("http", "1.2.0").with_dependency("log", req("^0.4"), true),
            plugin("http", "1.4.1").with_dependency("log", req("^0.4"), true),
            plugin("http", "2.0.0"),
            plugin("log", "0.3.9"),
            plugin("log", "0.4.2"),
            plugin("log", "0.5.0"),
        ]);

        let resolution = resolve(&app, &[], &registry);
        assert!(resolution.can_install, "{resolution:?}");
        assert_eq!(resolution.install_order, vec!["log", "http"]);
        let versions: Vec<(String, Version, bool)> = resolution
            .dependencies
            .iter()
            .map(|d| (d.plugin_id.clone(), d.version.clone(), d.installed))
            .collect();
        assert_eq!(
            versions,
            vec![
                ("http".to_string(), v("1.4.1"), false),
                ("log".to_string(), v("0.4.2"), false),
            ]
        );
    }

    #[test]
    fn unknown_required_dependency_is_missing() {
        let app = plugin("app", "1.0.0").with_dependency("ghost", req("^1"), true);
        let resolution = resolve(&app, &[], &RegistryView::new());
        assert_eq!(resolution.missing, vec!["ghost@^1"]);
        assert!(!resolution.can_install);
    }

    #[test]
    fn optional_problems_are_warnings_only() {
        let app = plugin("app", "1.0.0")
            .with_dependency("telemetry", req("^3"), false)
            .with_dependency("theme", req("^2"), false);
        let installed = vec![plugin("theme", "1.0.0")];

        let resolution = resolve(&app, &installed, &RegistryView::new());
        assert!(resolution.can_install);
        assert!(resolution.missing.is_empty());
        assert_eq!(resolution.warnings.len(), 2);
        assert!(resolution.warnings.iter().any(|w| w.contains("telemetry@^3")));
        assert!(resolution.warnings.iter().any(|w| w.contains("installed theme@1.0.0")));
    }

    #[test]
    fn required_cycle_is_an_unresolvable_conflict() {
        let a = plugin("a", "1.0.0").with_dependency("b", req("^1"), true);
        let registry = RegistryView::from_manifests([
            plugin("b", "1.0.0").with_dependency("c", req("^1"), true),
            plugin("c", "1.0.0").with_dependency("a", req("^1"), true),
        ]);

        let resolution = resolve(&a, &[], &registry);
        assert_eq!(resolution.conflicts, vec!["Circular dependency: a -> b -> c -> a"]);
        assert!(!resolution.can_install);
    }

    #[test]
    fn conflicting_constraints_from_installed_plugin() {
        let x = plugin("plugin-x", "1.0.0").with_dependency("lib-y", req("^2"), true);
        let installed = vec![
            plugin("lib-y", "1.3.0"),
            plugin("lib-z", "1.0.0").with_dependency("lib-y", req("^1"), true),
        ];

        let resolution = resolve(&x, &installed, &RegistryView::new());
        assert_eq!(
            resolution.conflicts,
            vec!["plugin-x requires lib-y@^2 but lib-z requires lib-y@^1"]
        );
        // The conflicted edge is not double-reported as missing.
        assert!(resolution.missing.is_empty());
        assert!(!resolution.can_install);
    }

    #[test]
    fn planned_dependency_must_satisfy_every_dependent() {
        let app = plugin("app", "1.0.0")
            .with_dependency("a", req("^1"), true)
            .with_dependency("b", req("^1"), true);
        let registry = RegistryView::from_manifests([
            plugin("a", "1.0.0").with_dependency("shared", req(">=1.0, <1.5"), true),
            plugin("b", "1.0.0").with_dependency("shared", req("^1.2"), true),
            plugin("shared", "1.1.0"),
            plugin("shared", "1.4.0"),
            plugin("shared", "1.9.0"),
        ]);

        let resolution = resolve(&app, &[], &registry);
        assert!(resolution.can_install, "{resolution:?}");
        let shared = resolution
            .dependencies
            .iter()
            .find(|d| d.plugin_id == "shared")
            .unwrap();
        assert_eq!(shared.version, v("1.4.0"));
        assert_eq!(resolution.install_order, vec!["shared", "a", "b"]);
    }

    #[test]
    fn upgrade_excludes_the_replaced_version() {
        let next = plugin("core", "2.0.0");
        let installed = vec![
            plugin("core", "1.0.0"),
            plugin("addon", "1.0.0").with_dependency("core", req("^1"), true),
        ];

        let resolution = resolve(&next, &installed, &RegistryView::new());
        assert_eq!(
            resolution.conflicts,
            vec!["addon requires core@^1 but core@2.0.0 is being installed"]
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let app = plugin("app", "1.0.0")
            .with_dependency("z", req("*"), true)
            .with_dependency("m", req("*"), true)
            .with_dependency("a", req("*"), false);
        let registry = RegistryView::from_manifests([
            plugin("z", "1.0.0"),
            plugin("m", "1.0.0").with_dependency("z", req("*"), true),
            plugin("a", "0.1.0"),
        ]);
        let installed = vec![plugin("q", "1.0.0")];

        let first = resolve(&app, &installed, &registry);
        let second = resolve(&app, &installed, &registry);
        assert_eq!(first, second);
        assert_eq!(first.install_order, vec!["a", "z", "m"]);
    }
}
