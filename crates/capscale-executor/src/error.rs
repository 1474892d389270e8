//! Executor error types.

use thiserror::Error;

use capscale_core::ClientError;

/// Errors returned for a single update job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("update rejected for {resource}: {source}")]
    Rejected {
        resource: String,
        #[source]
        source: ClientError,
    },

    #[error("update executor is shut down")]
    Closed,

    #[error("update worker dropped the job for {0}")]
    Dropped(String),
}

pub type UpdateResult<T> = Result<T, UpdateError>;
