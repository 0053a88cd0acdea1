use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("job not found")]
    NotFound,

    #[error("lease does not match current lease for job")]
    InvalidLease,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}
