//! # Context Relevance
//!
//! Ranks analyzed files against a task description and selects a
//! token-bounded subset of them as context.
//!
//! ```text
//! tasks ──► TaskAnalysis ─┐
//!                         ├─► FileScore per file ─► ranked ─► greedy selection ─► SelectedContext
//! FileProfile (cached) ───┤                                    (full / summary / skip)
//! DependencyGraph ────────┤
//! ComplexityReport ───────┘
//! ```
//!
//! Scores depend on the task and are recomputed per request; only the
//! task-independent [`FileProfile`] is worth caching.

mod error;
mod profile;
mod scoring;
mod selection;
mod task;

pub use error::{RelevanceError, Result};
pub use profile::{summarize, term_matches, FileProfile, SUMMARY_MAX_CHARS};
pub use scoring::{
    complexity_fit, score_file, FileScore, COMPLEXITY_WEIGHT, DEPENDENCY_WEIGHT, RECENCY_WEIGHT,
    RELEVANCE_WEIGHT,
};
pub use selection::{
    Candidate, ContextBudget, ContextBuilder, ContextMetadata, FailedFile, InclusionMode, Insight,
    InsightKind, SelectedContext, SelectedFile, DEFAULT_MAX_FILES, DEFAULT_MAX_TOKENS,
};
pub use task::{
    combined_text, ComplexityLevel, Intent, TaskAnalysis, TaskDescriptor, TaskType, UNKNOWN,
};
