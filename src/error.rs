//! Error types for jobq.

use thiserror::Error;

use crate::model::job::{JobId, Status};

#[derive(Debug, Error)]
pub enum Error {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid state transition for job {id}: {from} -> {to}")]
    InvalidTransition { id: JobId, from: String, to: Status },

    #[error("job {0} has no loaded record; fetch it first")]
    NotLoaded(JobId),

    #[error("no task registered for path {0:?}")]
    TaskNotFound(String),

    #[error("job {id} not finished after {waited_ms}ms")]
    WaitTimeout { id: JobId, waited_ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Infrastructure failures that a retry may cure: the store or queue
    /// backend was unreachable, or a connection dropped mid-operation.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_transient() {
        assert!(Error::Storage(sqlx::Error::PoolTimedOut).is_transient());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_transient());
    }

    #[test]
    fn protocol_and_logic_errors_are_not_transient() {
        assert!(!Error::Storage(sqlx::Error::Protocol("unexpected message".into())).is_transient());
        assert!(!Error::Storage(sqlx::Error::RowNotFound).is_transient());
        assert!(!Error::Other("bad payload".into()).is_transient());
    }
}
