//! Dependency graph built from manifest edges.
//!
//! Nodes are plugin ids, edges point from the dependent to its dependency.
//! petgraph provides strongly connected components for cycle detection; all
//! output is sorted so repeated builds over the same manifests agree.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use warden_types::plugin::{DependencyEdge, PluginManifest};

/// Directed graph of plugin dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, DependencyEdge>,
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union graph of every manifest's declared edges.
    pub fn from_manifests<'a, I>(manifests: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginManifest>,
    {
        let mut graph = Self::new();
        for manifest in manifests {
            graph.add_manifest(manifest);
        }
        graph
    }

    /// Add a node for the manifest and one edge per declared dependency.
    pub fn add_manifest(&mut self, manifest: &PluginManifest) {
        let from = self.node(&manifest.id);
        for edge in manifest.edges() {
            let to = self.node(&edge.dependency);
            self.graph.add_edge(from, to, edge);
        }
    }

    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }

    /// Plugin ids in lexicographic order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Edges pointing at `id`, ordered by dependent.
    pub fn edges_to(&self, id: &str) -> Vec<&DependencyEdge> {
        let Some(idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&DependencyEdge> = self
            .graph
            .edges_directed(*idx, Direction::Incoming)
            .map(|e| e.weight())
            .collect();
        edges.sort_by(|a, b| a.dependent.cmp(&b.dependent));
        edges
    }

    /// Ids whose manifests declare a required edge to `id`.
    pub fn required_dependents(&self, id: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .edges_to(id)
            .into_iter()
            .filter(|e| e.required)
            .map(|e| e.dependent.clone())
            .collect();
        dependents.dedup();
        dependents
    }

    /// Every elementary cycle witness over required edges, one per strongly
    /// connected component. Each cycle starts and ends at the component's
    /// lexicographically smallest id.
    pub fn required_cycles(&self) -> Vec<Vec<String>> {
        let required = self
            .graph
            .filter_map(|_, id| Some(id.clone()), |_, e| e.required.then_some(()));

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&required)
            .into_iter()
            .filter(|scc| scc.len() > 1 || required.contains_edge(scc[0], scc[0]))
            .filter_map(|scc| {
                let members: BTreeSet<NodeIndex> = scc.iter().copied().collect();
                let start = scc.iter().copied().min_by(|a, b| required[*a].cmp(&required[*b]))?;
                shortest_cycle(&required, start, &members)
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Deterministic install order over `ids`: dependencies before
    /// dependents, ties broken lexicographically. Edges leaving the set are
    /// ignored. If the remaining ids form a cycle (possible through optional
    /// edges) the smallest id is emitted to break it.
    pub fn install_order(&self, ids: &BTreeSet<String>) -> Vec<String> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = ids
            .iter()
            .map(|id| {
                let deps: BTreeSet<&str> = self
                    .nodes
                    .get(id)
                    .map(|idx| {
                        self.graph
                            .neighbors_directed(*idx, Direction::Outgoing)
                            .map(|n| self.graph[n].as_str())
                            .filter(|dep| *dep != id.as_str() && ids.contains(*dep))
                            .collect()
                    })
                    .unwrap_or_default();
                (id.as_str(), deps)
            })
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .find(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id);
            let Some(next) = ready.or_else(|| remaining.keys().next().copied()) else {
                break;
            };
            remaining.remove(next);
            for deps in remaining.values_mut() {
                deps.remove(next);
            }
            order.push(next.to_string());
        }
        order
    }
}

/// Breadth-first search for the shortest path from `start` back to itself
/// inside one strongly connected component. Successors are visited in id
/// order so the witness is stable.
fn shortest_cycle(
    graph: &DiGraph<String, ()>,
    start: NodeIndex,
    members: &BTreeSet<NodeIndex>,
) -> Option<Vec<String>> {
    let sorted_successors = |n: NodeIndex| {
        let mut next: Vec<NodeIndex> = graph
            .neighbors_directed(n, Direction::Outgoing)
            .filter(|m| members.contains(m))
            .collect();
        next.sort_by(|a, b| graph[*a].cmp(&graph[*b]));
        next.dedup();
        next
    };

    let mut parent: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for next in sorted_successors(current) {
            if next == start {
                let mut middle = Vec::new();
                let mut cursor = current;
                while cursor != start {
                    middle.push(graph[cursor].clone());
                    cursor = *parent.get(&cursor)?;
                }
                middle.reverse();

                let mut path = Vec::with_capacity(middle.len() + 2);
                path.push(graph[start].clone());
                path.extend(middle);
                path.push(graph[start].clone());
                return Some(path);
            }
            if !parent.contains_key(&next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    None
}

/// `"Circular dependency: a -> b -> a"`.
pub fn format_cycle(cycle: &[String]) -> String {
    format!("Circular dependency: {}", cycle.join(" -> "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::{Version, VersionReq};

    fn manifest(id: &str, deps: &[(&str, bool)]) -> PluginManifest {
        deps.iter().fold(
            PluginManifest::new(id, Version::new(1, 0, 0)),
            |m, (dep, required)| m.with_dependency(dep, VersionReq::STAR, *required),
        )
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn install_order_puts_dependencies_first() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("app", &[("http", true), ("log", true)]),
            manifest("http", &[("log", true), ("tls", true)]),
            manifest("tls", &[]),
            manifest("log", &[]),
        ]);
        let order = graph.install_order(&set(&["app", "http", "log", "tls"]));
        assert_eq!(order, vec!["log", "tls", "http", "app"]);
    }

    #[test]
    fn install_order_ignores_ids_outside_the_set() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("a", &[("b", true), ("installed", true)]),
            manifest("b", &[("installed", true)]),
        ]);
        assert_eq!(graph.install_order(&set(&["a", "b"])), vec!["b", "a"]);
    }

    #[test]
    fn install_order_breaks_optional_cycles() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("x", &[("y", false)]),
            manifest("y", &[("x", true)]),
        ]);
        assert_eq!(graph.install_order(&set(&["x", "y"])), vec!["x", "y"]);
        assert!(graph.required_cycles().is_empty());
    }

    #[test]
    fn detects_two_node_cycle() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("b", &[("a", true)]),
            manifest("a", &[("b", true)]),
        ]);
        let cycles = graph.required_cycles();
        assert_eq!(cycles, vec![vec!["a", "b", "a"]]);
        assert_eq!(format_cycle(&cycles[0]), "Circular dependency: a -> b -> a");
    }

    #[test]
    fn detects_longer_cycle_once() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("a", &[("b", true)]),
            manifest("b", &[("c", true)]),
            manifest("c", &[("a", true), ("d", true)]),
            manifest("d", &[]),
        ]);
        assert_eq!(graph.required_cycles(), vec![vec!["a", "b", "c", "a"]]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("a", &[("b", true), ("c", true)]),
            manifest("b", &[("c", true)]),
        ]);
        assert!(graph.required_cycles().is_empty());
    }

    #[test]
    fn required_dependents_skip_optional_edges() {
        let graph = DependencyGraph::from_manifests(&[
            manifest("a", &[("lib", true)]),
            manifest("b", &[("lib", false)]),
            manifest("c", &[("lib", true)]),
        ]);
        assert_eq!(graph.required_dependents("lib"), vec!["a", "c"]);
        assert!(graph.required_dependents("unknown").is_empty());
    }
}
