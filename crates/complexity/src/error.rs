use context_protocol::RecordError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ComplexityError>;

#[derive(Error, Debug)]
pub enum ComplexityError {
    #[error("Invalid file record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Function {name} not found in {path}")]
    FunctionNotFound { path: String, name: String },
}
