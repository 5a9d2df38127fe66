use crate::error::{GraphError, Result};
use crate::types::{Cycle, FileNode, GraphSummary, ImpactAnalysis, ImportTarget};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const DIRECT_WEIGHT: f64 = 1.0;
const TRANSITIVE_WEIGHT: f64 = 0.5;
const MAX_CRITICALITY: f64 = 10.0;
const SUMMARY_TOP_N: usize = 5;

/// File-level import graph of one analyzed file set.
///
/// Immutable once assembled: any import change means assembling a new graph,
/// so `imported_by` can never drift from `imports`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    files: BTreeMap<String, FileNode>,
    /// Internal import edges, importer -> imported
    edges: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    pub(crate) fn from_parts(
        files: BTreeMap<String, FileNode>,
        edges: DiGraph<String, ()>,
        indices: HashMap<String, NodeIndex>,
    ) -> Self {
        Self {
            files,
            edges,
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn file(&self, path: &str) -> Option<&FileNode> {
        self.files.get(path)
    }

    /// Files in path order
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.files.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.edge_count()
    }

    /// Internal files `path` imports (one hop)
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.neighbors_sorted(path, Direction::Outgoing)
    }

    /// Files importing `path` directly
    pub fn direct_dependents(&self, path: &str) -> Vec<String> {
        self.files
            .get(path)
            .map(|node| node.imported_by.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every file reachable through `imported_by`, excluding `path` itself
    pub fn transitive_impact(&self, path: &str) -> Vec<String> {
        let Some(&start) = self.indices.get(path) else {
            return Vec::new();
        };

        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        visited.insert(start);
        let mut stack = vec![start];
        let mut impacted = BTreeSet::new();

        while let Some(current) = stack.pop() {
            for dependent in self.edges.neighbors_directed(current, Direction::Incoming) {
                if visited.insert(dependent) {
                    impacted.insert(self.edges[dependent].clone());
                    stack.push(dependent);
                }
            }
        }

        impacted.into_iter().collect()
    }

    pub fn blast_radius(&self, path: &str) -> usize {
        self.transitive_impact(path).len()
    }

    /// `direct + 0.5 * transitive`, bounded to `[0, 10]`.
    ///
    /// The walk stops as soon as the score saturates, so scoring every node
    /// stays cheap on large, densely connected graphs.
    pub fn criticality_score(&self, path: &str) -> f64 {
        let direct = self.direct_dependents(path).len();
        let headroom = (MAX_CRITICALITY - direct as f64 * DIRECT_WEIGHT) / TRANSITIVE_WEIGHT;
        let limit = headroom.ceil().max(0.0) as usize;
        criticality(direct, self.transitive_count_up_to(path, limit))
    }

    /// `transitive_impact(path).len()`, but no more than `limit`
    fn transitive_count_up_to(&self, path: &str, limit: usize) -> usize {
        let Some(&start) = self.indices.get(path) else {
            return 0;
        };
        if limit == 0 {
            return 0;
        }

        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        visited.insert(start);
        let mut stack = vec![start];
        let mut count = 0;

        while let Some(current) = stack.pop() {
            for dependent in self.edges.neighbors_directed(current, Direction::Incoming) {
                if visited.insert(dependent) {
                    count += 1;
                    if count >= limit {
                        return count;
                    }
                    stack.push(dependent);
                }
            }
        }
        count
    }

    pub fn impact(&self, path: &str) -> Result<ImpactAnalysis> {
        if !self.contains(path) {
            return Err(GraphError::FileNotFound(path.to_string()));
        }
        let direct_dependents = self.direct_dependents(path);
        let transitive_impact = self.transitive_impact(path);
        Ok(ImpactAnalysis {
            path: path.to_string(),
            criticality: criticality(direct_dependents.len(), transitive_impact.len()),
            blast_radius: transitive_impact.len(),
            direct_dependents,
            transitive_impact,
        })
    }

    /// Union of the transitive impact of every changed path, changed paths included
    pub fn impacted_by(&self, changed: &[String]) -> BTreeSet<String> {
        let mut affected: BTreeSet<String> = changed.iter().cloned().collect();
        for path in changed {
            affected.extend(self.transitive_impact(path));
        }
        affected
    }

    /// Changed paths plus their direct dependents
    pub fn directly_affected_by(&self, changed: &[String]) -> BTreeSet<String> {
        let mut affected: BTreeSet<String> = changed.iter().cloned().collect();
        for path in changed {
            affected.extend(self.direct_dependents(path));
        }
        affected
    }

    /// Import cycles, each reported once.
    ///
    /// Iterative DFS with an on-stack mark. A back edge to a node still on the
    /// stack yields the stack slice from that node. Nodes are marked done once
    /// their subtree is exhausted, so the traversal is linear in nodes and edges.
    pub fn detect_cycles(&self) -> Vec<Cycle> {
        let node_count = self.edges.node_count();
        let mut marks = vec![Mark::Unvisited; node_count];
        let mut stack_pos: Vec<Option<usize>> = vec![None; node_count];
        let mut cycles = Vec::new();

        let mut roots: Vec<NodeIndex> = self.edges.node_indices().collect();
        roots.sort_by(|a, b| self.edges[*a].cmp(&self.edges[*b]));

        for root in roots {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }

            // (node, sorted successors, next successor)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            marks[root.index()] = Mark::OnStack;
            stack_pos[root.index()] = Some(0);
            stack.push((root, self.sorted_successors(root), 0));

            while let Some(frame) = stack.last_mut() {
                if frame.2 < frame.1.len() {
                    let next = frame.1[frame.2];
                    frame.2 += 1;
                    match marks[next.index()] {
                        Mark::Unvisited => {
                            marks[next.index()] = Mark::OnStack;
                            stack_pos[next.index()] = Some(stack.len());
                            let successors = self.sorted_successors(next);
                            stack.push((next, successors, 0));
                        }
                        Mark::OnStack => {
                            if let Some(start) = stack_pos[next.index()] {
                                let files = stack[start..]
                                    .iter()
                                    .map(|(node, _, _)| self.edges[*node].clone())
                                    .collect();
                                cycles.push(Cycle::new(files));
                            }
                        }
                        Mark::Done => {}
                    }
                } else {
                    let node = frame.0;
                    marks[node.index()] = Mark::Done;
                    stack_pos[node.index()] = None;
                    stack.pop();
                }
            }
        }

        if !cycles.is_empty() {
            log::debug!("Detected {} import cycle(s)", cycles.len());
        }
        cycles
    }

    pub fn summary(&self) -> GraphSummary {
        let mut package_users: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        let mut external_edges = 0;
        for node in self.files.values() {
            for import in &node.imports {
                if let ImportTarget::External(package) = &import.target {
                    external_edges += 1;
                    package_users
                        .entry(package.clone())
                        .or_default()
                        .insert(node.path.as_str());
                }
            }
        }

        let mut external_packages: Vec<(String, usize)> = package_users
            .into_iter()
            .map(|(package, users)| (package, users.len()))
            .collect();
        external_packages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut most_critical: Vec<(String, f64)> = self
            .files
            .keys()
            .map(|path| (path.clone(), self.criticality_score(path)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        most_critical.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_critical.truncate(SUMMARY_TOP_N);

        let orphans = self
            .files
            .values()
            .filter(|node| node.internal_import_count() == 0 && node.imported_by.is_empty())
            .map(|node| node.path.clone())
            .collect();

        GraphSummary {
            file_count: self.files.len(),
            internal_edges: self.edges.edge_count(),
            external_edges,
            external_packages,
            most_critical,
            orphans,
        }
    }

    /// External package names a file imports
    pub fn external_packages_of(&self, path: &str) -> Vec<String> {
        let Some(node) = self.files.get(path) else {
            return Vec::new();
        };
        let mut packages: Vec<String> = node
            .imports
            .iter()
            .filter_map(|import| match &import.target {
                ImportTarget::External(package) => Some(package.clone()),
                ImportTarget::Internal(_) => None,
            })
            .collect();
        packages.sort();
        packages.dedup();
        packages
    }

    fn sorted_successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<NodeIndex> = self.edges.neighbors(node).collect();
        successors.sort_by(|a, b| self.edges[*a].cmp(&self.edges[*b]));
        successors.dedup();
        successors
    }

    fn neighbors_sorted(&self, path: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.indices.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .edges
            .neighbors_directed(idx, direction)
            .map(|n| self.edges[n].clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

fn criticality(direct: usize, transitive: usize) -> f64 {
    (direct as f64 * DIRECT_WEIGHT + transitive as f64 * TRANSITIVE_WEIGHT).min(MAX_CRITICALITY)
}

