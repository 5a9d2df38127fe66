use context_protocol::RecordError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph build error: {0}")]
    BuildError(String),

    #[error("Invalid file record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("File not found in graph: {0}")]
    FileNotFound(String),
}
