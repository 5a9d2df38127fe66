use crate::error::{GraphError, Result};
use crate::extract::extract_dependencies;
use crate::graph::DependencyGraph;
use crate::resolve::{package_name, resolve_import};
use crate::types::{
    CallTarget, EdgeProvenance, FileDependencies, FileNode, FunctionCall, ImportTarget,
    ResolvedImport,
};
use context_protocol::FileRecord;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Builds [`DependencyGraph`]s from parsed file records.
///
/// Extraction is per file and only depends on that file, so callers may cache
/// [`FileDependencies`] by content hash and hand them to [`Self::assemble`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyMapper;

impl DependencyMapper {
    pub fn new() -> Self {
        Self
    }

    /// Per-file pass: raw imports, exports, heuristic calls and inheritance
    pub fn extract(&self, record: &FileRecord) -> Result<FileDependencies> {
        record.validate()?;
        Ok(extract_dependencies(record))
    }

    /// Extract and assemble in one go. Invalid records are skipped.
    pub fn build(&self, records: &[FileRecord]) -> Result<DependencyGraph> {
        let mut extracted = Vec::with_capacity(records.len());
        for record in records {
            match self.extract(record) {
                Ok(deps) => extracted.push(deps),
                Err(e) => log::warn!("Skipping {} in dependency graph: {e}", record.path),
            }
        }
        self.assemble(extracted)
    }

    /// Two-pass construction.
    ///
    /// Pass 1 resolves every import against the known file set and records
    /// forward edges. Pass 2 derives `imported_by` from the finished edge set.
    pub fn assemble(&self, extracted: Vec<FileDependencies>) -> Result<DependencyGraph> {
        let mut by_path: BTreeMap<String, FileDependencies> = BTreeMap::new();
        for deps in extracted {
            if deps.path.trim().is_empty() {
                return Err(GraphError::BuildError(
                    "file dependencies with an empty path".to_string(),
                ));
            }
            if by_path.contains_key(&deps.path) {
                log::warn!("Duplicate file {} in graph input, keeping the later one", deps.path);
            }
            by_path.insert(deps.path.clone(), deps);
        }

        let known: BTreeSet<String> = by_path.keys().cloned().collect();

        // function name -> defining files, path order
        let mut definitions: HashMap<&str, Vec<&str>> = HashMap::new();
        for deps in by_path.values() {
            for name in &deps.defined_functions {
                definitions
                    .entry(name.as_str())
                    .or_default()
                    .push(deps.path.as_str());
            }
        }

        let mut edges: DiGraph<String, ()> = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::with_capacity(by_path.len());
        for path in &known {
            let idx = edges.add_node(path.clone());
            indices.insert(path.clone(), idx);
        }

        // Pass 1: forward edges
        let mut nodes: BTreeMap<String, FileNode> = BTreeMap::new();
        let mut seen_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for deps in by_path.values() {
            let imports = resolve_imports(deps, &known);

            if let Some(&from) = indices.get(&deps.path) {
                for target in imports.iter().filter_map(ResolvedImport::internal_path) {
                    if let Some(&to) = indices.get(target) {
                        if from != to && seen_edges.insert((from, to)) {
                            edges.add_edge(from, to, ());
                        }
                    }
                }
            }

            let imported: HashSet<&str> = imports
                .iter()
                .filter_map(ResolvedImport::internal_path)
                .collect();
            let function_calls = deps
                .calls
                .iter()
                .map(|call| FunctionCall {
                    name: call.name.clone(),
                    line: call.line,
                    target: classify_call(&call.name, &deps.path, &imported, &definitions),
                    provenance: EdgeProvenance::Heuristic,
                })
                .collect();

            nodes.insert(
                deps.path.clone(),
                FileNode {
                    path: deps.path.clone(),
                    language: deps.language,
                    imports,
                    exports: deps.exports.clone(),
                    imported_by: BTreeSet::new(),
                    function_calls,
                    inheritance: deps.inheritance.clone(),
                },
            );
        }

        // Pass 2: reverse edges
        for (path, node) in nodes.iter_mut() {
            if let Some(&idx) = indices.get(path) {
                node.imported_by = edges
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|n| edges[n].clone())
                    .collect();
            }
        }

        log::info!(
            "Built dependency graph: {} files, {} internal edges",
            nodes.len(),
            edges.edge_count()
        );

        Ok(DependencyGraph::from_parts(nodes, edges, indices))
    }
}

fn resolve_imports(deps: &FileDependencies, known: &BTreeSet<String>) -> Vec<ResolvedImport> {
    deps.imports
        .iter()
        .map(|raw| {
            let target = match resolve_import(&deps.path, deps.language, &raw.source, known) {
                Some(path) => ImportTarget::Internal(path),
                None => ImportTarget::External(package_name(&raw.source, deps.language)),
            };
            ResolvedImport {
                source: raw.source.clone(),
                target,
                names: raw.names.clone(),
            }
        })
        .collect()
}

/// Same file first, then a file this one imports, then any defining file
fn classify_call(
    name: &str,
    caller: &str,
    imported: &HashSet<&str>,
    definitions: &HashMap<&str, Vec<&str>>,
) -> CallTarget {
    let Some(files) = definitions.get(name) else {
        return CallTarget::External;
    };
    if files.contains(&caller) {
        return CallTarget::Internal(caller.to_string());
    }
    files
        .iter()
        .find(|file| imported.contains(**file))
        .or_else(|| files.first())
        .map(|file| CallTarget::Internal((*file).to_string()))
        .unwrap_or(CallTarget::External)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CycleSeverity;
    use context_protocol::FunctionSymbol;
    use pretty_assertions::assert_eq;

    fn ts(path: &str, imports: &[&str]) -> FileRecord {
        FileRecord::from_source(path, "export const x = 1;\n").with_imports(imports.iter().copied())
    }

    #[test]
    fn imported_by_is_reverse_of_internal_imports() {
        let graph = DependencyMapper::new()
            .build(&[
                ts("src/app.ts", &["./auth/login", "react"]),
                ts("src/auth/login.ts", &["../utils/session"]),
                ts("src/utils/session.ts", &[]),
            ])
            .unwrap();

        assert_eq!(graph.direct_dependents("src/auth/login.ts"), vec!["src/app.ts"]);
        assert_eq!(
            graph.direct_dependents("src/utils/session.ts"),
            vec!["src/auth/login.ts"]
        );
        assert!(graph.direct_dependents("src/app.ts").is_empty());

        for node in graph.files() {
            for target in node.internal_imports() {
                assert!(graph
                    .file(target)
                    .map(|t| t.imported_by.contains(&node.path))
                    .unwrap_or(false));
            }
        }

        let app = graph.file("src/app.ts").unwrap();
        assert_eq!(app.external_import_count(), 1);
        assert_eq!(
            app.imports[1].target,
            ImportTarget::External("react".to_string())
        );
    }

    #[test]
    fn detects_exactly_one_three_file_cycle() {
        let graph = DependencyMapper::new()
            .build(&[
                ts("a.ts", &["./b"]),
                ts("b.ts", &["./c"]),
                ts("c.ts", &["./a"]),
                ts("d.ts", &["./a"]),
            ])
            .unwrap();

        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        let members: BTreeSet<&str> = cycles[0].files.iter().map(String::as_str).collect();
        assert_eq!(members, BTreeSet::from(["a.ts", "b.ts", "c.ts"]));
        assert_eq!(cycles[0].severity, CycleSeverity::Low);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let graph = DependencyMapper::new()
            .build(&[
                ts("a.ts", &["./b", "./c"]),
                ts("b.ts", &["./c"]),
                ts("c.ts", &[]),
            ])
            .unwrap();
        assert!(graph.detect_cycles().is_empty());
    }

    #[test]
    fn long_chain_is_traversed_without_recursion() {
        let n = 5000;
        let records: Vec<FileRecord> = (0..n)
            .map(|i| {
                let imports: Vec<String> = if i + 1 < n {
                    vec![format!("./f{:05}", i + 1)]
                } else {
                    vec!["./f00000".to_string()]
                };
                FileRecord::from_source(format!("f{i:05}.ts"), "x\n").with_imports(imports)
            })
            .collect();
        let graph = DependencyMapper::new().build(&records).unwrap();
        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), n);
        assert_eq!(cycles[0].severity, CycleSeverity::High);
        assert_eq!(graph.blast_radius("f00000.ts"), n - 1);

        let summary = graph.summary();
        let top: Vec<(&str, f64)> = summary
            .most_critical
            .iter()
            .map(|(path, score)| (path.as_str(), *score))
            .collect();
        assert_eq!(
            top,
            vec![
                ("f00000.ts", 10.0),
                ("f00001.ts", 10.0),
                ("f00002.ts", 10.0),
                ("f00003.ts", 10.0),
                ("f00004.ts", 10.0),
            ]
        );
    }

    #[test]
    fn impact_follows_dependents_transitively() {
        let graph = DependencyMapper::new()
            .build(&[
                ts("core.ts", &[]),
                ts("service.ts", &["./core"]),
                ts("api.ts", &["./service"]),
                ts("ui.ts", &["./api", "./core"]),
            ])
            .unwrap();

        let impact = graph.impact("core.ts").unwrap();
        assert_eq!(impact.direct_dependents, vec!["service.ts", "ui.ts"]);
        assert_eq!(impact.transitive_impact, vec!["api.ts", "service.ts", "ui.ts"]);
        assert_eq!(impact.blast_radius, 3);
        assert!((impact.criticality - 3.5).abs() < f64::EPSILON);
        assert!((graph.criticality_score("core.ts") - 3.5).abs() < f64::EPSILON);
        assert!((graph.criticality_score("service.ts") - 2.0).abs() < f64::EPSILON);

        assert!(matches!(
            graph.impact("missing.ts"),
            Err(GraphError::FileNotFound(_))
        ));
    }

    #[test]
    fn criticality_is_bounded() {
        let mut records = vec![ts("shared.ts", &[])];
        records.extend((0..40).map(|i| ts(&format!("user{i}.ts"), &["./shared"])));
        let graph = DependencyMapper::new().build(&records).unwrap();
        assert_eq!(graph.criticality_score("shared.ts"), 10.0);
    }

    #[test]
    fn calls_prefer_local_then_imported_definitions() {
        let helpers = FileRecord::from_source("helpers.ts", "export function hash(x) {}\n")
            .with_functions(vec![FunctionSymbol::new("hash", 1, 1).exported()]);
        let other = FileRecord::from_source("other.ts", "export function hash(x) {}\n")
            .with_functions(vec![FunctionSymbol::new("hash", 1, 1).exported()]);
        let caller = FileRecord::from_source("zcaller.ts", "const h = hash(pw);\nfetch(url);\n")
            .with_imports(["./other"]);

        let graph = DependencyMapper::new()
            .build(&[helpers, other, caller])
            .unwrap();
        let calls = &graph.file("zcaller.ts").unwrap().function_calls;
        assert_eq!(calls[0].target, CallTarget::Internal("other.ts".to_string()));
        assert_eq!(calls[0].provenance, EdgeProvenance::Heuristic);
        assert_eq!(calls[1].target, CallTarget::External);
    }

    #[test]
    fn summary_reports_packages_and_orphans() {
        let graph = DependencyMapper::new()
            .build(&[
                ts("a.ts", &["react", "./b"]),
                ts("b.ts", &["react", "lodash/fp"]),
                ts("lonely.ts", &[]),
            ])
            .unwrap();
        let summary = graph.summary();
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.internal_edges, 1);
        assert_eq!(summary.external_edges, 3);
        assert_eq!(
            summary.external_packages,
            vec![("react".to_string(), 2), ("lodash".to_string(), 1)]
        );
        assert_eq!(summary.orphans, vec!["lonely.ts"]);
        assert_eq!(summary.most_critical[0].0, "b.ts");
    }

    #[test]
    fn invalid_records_are_skipped() {
        let bad = FileRecord::from_source("/abs/path.ts", "x");
        let graph = DependencyMapper::new()
            .build(&[bad, ts("ok.ts", &[])])
            .unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.contains("ok.ts"));
    }
}
