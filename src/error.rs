use std::convert::Infallible;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of one dispatched work item.
pub type ItemResult<R, E = Infallible> = std::result::Result<R, TaskError<E>>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("execution pool has shut down")]
    PoolShutdown,

    #[error("profile error: {0}")]
    Profile(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn profile<S: Into<String>>(msg: S) -> Self {
        Error::Profile(msg.into())
    }
}

/// Why a single work item did not produce a value.
///
/// Attached to the item's slot in the result collection; never aborts the
/// other items of the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError<E> {
    /// The worker returned `Err`.
    #[error("worker failed: {0}")]
    Failed(E),

    /// The worker panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Waiting for the result took longer than the configured timeout.
    #[error("timed out after {0:?} waiting for result")]
    TimedOut(Duration),

    /// The invocation was discarded before it could report back.
    #[error("worker invocation dropped before producing a result")]
    Dropped,
}

impl<E> TaskError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::TimedOut(_))
    }

    /// True for failures raised by the worker itself (error or panic).
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, TaskError::Failed(_) | TaskError::Panicked(_))
    }

    /// The worker's own error value, if that is what this is.
    pub fn failure(&self) -> Option<&E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_kinds() {
        let timeout: TaskError<String> = TaskError::TimedOut(Duration::from_millis(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_worker_failure());
        assert!(timeout.failure().is_none());

        let failed = TaskError::Failed("boom".to_string());
        assert!(failed.is_worker_failure());
        assert_eq!(failed.failure().map(String::as_str), Some("boom"));
        assert_eq!(failed.into_failure(), Some("boom".to_string()));

        let panicked: TaskError<String> = TaskError::Panicked("oops".into());
        assert!(panicked.is_worker_failure());
        assert!(panicked.failure().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = Error::config("max_parallel must be > 0");
        assert_eq!(err.to_string(), "config error: max_parallel must be > 0");

        let err: TaskError<&str> = TaskError::Failed("division by zero");
        assert_eq!(err.to_string(), "worker failed: division by zero");
    }
}
