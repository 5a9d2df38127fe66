//! # Context Graph
//!
//! File-level dependency mapping for the code-intelligence cache.
//!
//! ## Features
//!
//! - **Import resolution** - relative JS/TS specifiers, Python dotted modules, Rust module paths
//! - **Reverse edges** - `imported_by` derived from the finished forward edge set
//! - **Cycle detection** - one linear DFS pass, severity by cycle length
//! - **Impact analysis** - direct dependents, transitive impact, blast radius, criticality
//!
//! ## Architecture
//!
//! ```text
//! FileRecord[]
//!     │
//!     ├──> DependencyMapper::extract (per file, cacheable)
//!     │      ├─ Raw imports / exports
//!     │      ├─ Heuristic call sites
//!     │      └─ Heuristic inheritance
//!     │
//!     └──> DependencyMapper::assemble (whole set)
//!            ├─ Pass 1: resolve imports, forward edges (petgraph)
//!            └─ Pass 2: imported_by from incoming edges
//! ```
//!
//! Call and inheritance edges are tagged [`EdgeProvenance::Heuristic`] and
//! only feed relevance scoring.

mod builder;
mod error;
mod extract;
mod graph;
mod resolve;
mod types;

pub use builder::DependencyMapper;
pub use error::{GraphError, Result};
pub use graph::DependencyGraph;
pub use types::{
    CallSite, CallTarget, Cycle, CycleSeverity, EdgeProvenance, FileDependencies, FileNode,
    FunctionCall, GraphSummary, ImpactAnalysis, ImportTarget, InheritanceKind, InheritanceLink,
    RawImport, ResolvedImport,
};
