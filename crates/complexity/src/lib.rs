//! # Context Complexity
//!
//! Per-function, per-class and per-file complexity scoring from parsed file
//! records: cyclomatic, cognitive (nesting-weighted, capped), Halstead,
//! nesting depth and maintenance penalties, rolled up into a bounded
//! overall score, a maintainability index and a technical-debt estimate.
//!
//! Scanning is text based. Comments and string literals are stripped before
//! counting, but the counts remain approximations of what an AST walk would
//! report. Issues and recommendations are diagnostic text.

mod config;
mod error;
mod halstead;
mod scanner;
mod scorer;
mod types;

pub use config::{ComplexityConfig, ComplexityThresholds, COGNITIVE_CAP};
pub use error::{ComplexityError, Result};
pub use halstead::compute as halstead_from_counts;
pub use scorer::{
    external_dependency_count, maintainability_index, maintenance_score, overall_score,
    technical_debt_hours, ComplexityScorer,
};
pub use types::{
    ClassComplexity, ComplexityIssue, ComplexityReport, FileComplexity, FunctionComplexity,
    HalsteadMetrics, IssueKind, IssueSeverity,
};
