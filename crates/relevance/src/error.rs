use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelevanceError>;

#[derive(Error, Debug)]
pub enum RelevanceError {
    #[error("Invalid budget: {0}")]
    InvalidBudget(String),

    #[error("Duplicate candidate: {0}")]
    DuplicateCandidate(String),

    #[error("Score for {path} is not finite")]
    NonFiniteScore { path: String },
}
