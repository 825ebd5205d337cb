use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlMiddlewareDbError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<SqlMiddlewareDbError>> for SqlMiddlewareDbError {
    fn from(err: bb8::RunError<SqlMiddlewareDbError>) -> Self {
        SqlMiddlewareDbError::ConnectionError(format!("SQLite pool error: {err}"))
    }
}

/// Stable identifier for the way an update sequence failed.
///
/// `Display` renders the kebab-case tag (`step2-count-mismatch`), with step
/// numbers starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureTag {
    InvalidSequence,
    Begin,
    StepExec(usize),
    StepCountMismatch(usize),
    Commit,
}

impl fmt::Display for FailureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureTag::InvalidSequence => f.write_str("invalid-sequence"),
            FailureTag::Begin => f.write_str("begin-error"),
            FailureTag::StepExec(step) => write!(f, "step{step}-exec-error"),
            FailureTag::StepCountMismatch(step) => write!(f, "step{step}-count-mismatch"),
            FailureTag::Commit => f.write_str("commit-error"),
        }
    }
}

/// Failure of a transactional update sequence.
///
/// Every variant raised after the transaction began carries the outcome of the
/// single rollback attempt in `rollback`; a failed rollback never replaces the
/// primary reason.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("invalid-sequence: {0}")]
    InvalidSequence(String),

    #[error("begin-error: {source}")]
    Begin {
        #[source]
        source: SqlMiddlewareDbError,
    },

    #[error("step{step}-exec-error: {source}")]
    StepExec {
        step: usize,
        #[source]
        source: SqlMiddlewareDbError,
        rollback: Option<SqlMiddlewareDbError>,
    },

    #[error("step{step}-count-mismatch: expected {expected} rows affected, got {actual}")]
    StepCountMismatch {
        step: usize,
        expected: u64,
        actual: u64,
        rollback: Option<SqlMiddlewareDbError>,
    },

    #[error("commit-error: {source}")]
    Commit {
        #[source]
        source: SqlMiddlewareDbError,
        rollback: Option<SqlMiddlewareDbError>,
    },
}

impl SequenceError {
    #[must_use]
    pub fn tag(&self) -> FailureTag {
        match self {
            SequenceError::InvalidSequence(_) => FailureTag::InvalidSequence,
            SequenceError::Begin { .. } => FailureTag::Begin,
            SequenceError::StepExec { step, .. } => FailureTag::StepExec(*step),
            SequenceError::StepCountMismatch { step, .. } => FailureTag::StepCountMismatch(*step),
            SequenceError::Commit { .. } => FailureTag::Commit,
        }
    }

    /// The error reported by the rollback attempt, if it failed.
    #[must_use]
    pub fn rollback_error(&self) -> Option<&SqlMiddlewareDbError> {
        match self {
            SequenceError::StepExec { rollback, .. }
            | SequenceError::StepCountMismatch { rollback, .. }
            | SequenceError::Commit { rollback, .. } => rollback.as_ref(),
            SequenceError::InvalidSequence(_) | SequenceError::Begin { .. } => None,
        }
    }

    /// 1-based index of the step that failed, if the failure belongs to a step.
    #[must_use]
    pub fn step(&self) -> Option<usize> {
        match self {
            SequenceError::StepExec { step, .. }
            | SequenceError::StepCountMismatch { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub(crate) fn attach_rollback(mut self, err: SqlMiddlewareDbError) -> Self {
        match &mut self {
            SequenceError::StepExec { rollback, .. }
            | SequenceError::StepCountMismatch { rollback, .. }
            | SequenceError::Commit { rollback, .. } => *rollback = Some(err),
            SequenceError::InvalidSequence(_) | SequenceError::Begin { .. } => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_render_with_one_based_steps() {
        assert_eq!(FailureTag::Begin.to_string(), "begin-error");
        assert_eq!(FailureTag::StepExec(1).to_string(), "step1-exec-error");
        assert_eq!(
            FailureTag::StepCountMismatch(2).to_string(),
            "step2-count-mismatch"
        );
        assert_eq!(FailureTag::Commit.to_string(), "commit-error");
    }

    #[test]
    fn rollback_error_does_not_mask_primary_reason() {
        let err = SequenceError::StepCountMismatch {
            step: 2,
            expected: 1,
            actual: 0,
            rollback: None,
        }
        .attach_rollback(SqlMiddlewareDbError::ExecutionError("disk gone".into()));

        assert_eq!(err.tag(), FailureTag::StepCountMismatch(2));
        assert_eq!(err.step(), Some(2));
        assert!(err.rollback_error().is_some());
        assert_eq!(
            err.to_string(),
            "step2-count-mismatch: expected 1 rows affected, got 0"
        );
    }

    #[test]
    fn begin_failure_has_no_rollback_slot() {
        let err = SequenceError::Begin {
            source: SqlMiddlewareDbError::ConnectionError("closed".into()),
        }
        .attach_rollback(SqlMiddlewareDbError::Other("ignored".into()));
        assert!(err.rollback_error().is_none());
        assert_eq!(err.tag().to_string(), "begin-error");
    }
}
