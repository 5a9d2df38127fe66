use context_protocol::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where an edge came from.
///
/// `Heuristic` edges are produced by name-based pattern matching over source
/// text. They can both miss real relationships (dynamic dispatch, aliased
/// imports) and invent false ones (two unrelated functions sharing a name), so
/// they only feed relevance scoring and never invalidation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeProvenance {
    /// Reported by the language parser
    Parser,
    /// Pattern-matched, approximate
    Heuristic,
}

/// Import statement as written, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    pub source: String,
    pub names: Vec<String>,
    pub line: usize,
}

/// Call site found in source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceKind {
    Extends,
    Implements,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritanceLink {
    pub class_name: String,
    pub kind: InheritanceKind,
    pub target: String,
    pub provenance: EdgeProvenance,
}

/// Per-file extraction result. Depends only on the file itself, so it can be
/// cached by content hash and reused across graph rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependencies {
    pub path: String,
    pub language: Language,
    pub imports: Vec<RawImport>,
    pub exports: Vec<String>,
    pub defined_functions: Vec<String>,
    pub calls: Vec<CallSite>,
    pub inheritance: Vec<InheritanceLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ImportTarget {
    /// Resolved to another file of the analyzed set
    Internal(String),
    /// Opaque package reference (`react`, `numpy`, `@scope/pkg`)
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImport {
    pub source: String,
    pub target: ImportTarget,
    pub names: Vec<String>,
}

impl ResolvedImport {
    pub fn internal_path(&self) -> Option<&str> {
        match &self.target {
            ImportTarget::Internal(path) => Some(path),
            ImportTarget::External(_) => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.target, ImportTarget::External(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "file")]
pub enum CallTarget {
    Internal(String),
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub line: usize,
    pub target: CallTarget,
    pub provenance: EdgeProvenance,
}

/// One file of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub path: String,
    pub language: Language,
    pub imports: Vec<ResolvedImport>,
    pub exports: Vec<String>,
    /// Reverse of one hop of `imports`, restricted to internal targets
    pub imported_by: BTreeSet<String>,
    pub function_calls: Vec<FunctionCall>,
    pub inheritance: Vec<InheritanceLink>,
}

impl FileNode {
    pub fn internal_imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().filter_map(ResolvedImport::internal_path)
    }

    pub fn internal_import_count(&self) -> usize {
        self.internal_imports().count()
    }

    pub fn external_import_count(&self) -> usize {
        self.imports.iter().filter(|i| i.is_external()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSeverity {
    Low,
    Medium,
    High,
}

impl CycleSeverity {
    pub fn from_length(len: usize) -> Self {
        if len <= 3 {
            Self::Low
        } else if len <= 5 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Circular import chain: each file imports the next, the last imports the first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub files: Vec<String>,
    pub severity: CycleSeverity,
}

impl Cycle {
    pub fn new(files: Vec<String>) -> Self {
        let severity = CycleSeverity::from_length(files.len());
        Self { files, severity }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }
}

/// Blast-radius view of a single file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub path: String,
    pub direct_dependents: Vec<String>,
    pub transitive_impact: Vec<String>,
    pub blast_radius: usize,
    /// Bounded to `[0, 10]`
    pub criticality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub file_count: usize,
    pub internal_edges: usize,
    pub external_edges: usize,
    /// Package name and number of importing files, most used first
    pub external_packages: Vec<(String, usize)>,
    pub most_critical: Vec<(String, f64)>,
    /// Files that neither import nor are imported by any other analyzed file
    pub orphans: Vec<String>,
}
