use context_complexity::ComplexityError;
use context_graph::GraphError;
use context_invalidation::InvalidationError;
use context_protocol::RecordError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid file record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Dependency analysis failed: {0}")]
    Graph(#[from] GraphError),

    #[error("Complexity analysis failed: {0}")]
    Complexity(#[from] ComplexityError),

    #[error("Invalidation error: {0}")]
    Invalidation(#[from] InvalidationError),

    #[error("Failed to load {path}: {reason}")]
    Source { path: String, reason: String },

    #[error("Analyses of {0} are incomplete")]
    IncompleteAnalysis(String),

    #[error("No source provider configured")]
    NoSource,

    #[error("Analysis task for {path} did not complete: {reason}")]
    Join { path: String, reason: String },
}
