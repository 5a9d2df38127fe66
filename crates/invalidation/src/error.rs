use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvalidationError>;

#[derive(Error, Debug)]
pub enum InvalidationError {
    #[error("Change queue is full")]
    QueueFull,

    #[error("Invalidation loop has shut down")]
    Closed,

    #[error("Preemptive analysis failed for {path}: {reason}")]
    Preemptive { path: String, reason: String },
}
