// In-memory Session that records every call, for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::SqlMiddlewareDbError;
use crate::results::{ExecResult, ResultSet};
use crate::session::Session;
use crate::types::RowValues;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Begin,
    Exec(String),
    Select(String),
    Commit,
    Rollback,
    Abandon,
}

/// Scripted session. Each `exec` pops the next outcome from `exec_outcomes`
/// (`Ok(rows)` or `Err(message)`); an empty script reports one row.
#[derive(Debug, Default)]
pub(crate) struct RecordingSession {
    pub calls: Vec<Call>,
    pub exec_outcomes: VecDeque<Result<u64, String>>,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    /// `exec` never completes, so callers can be cancelled mid-step.
    pub hang_on_exec: bool,
    pub in_tx: bool,
}

impl RecordingSession {
    pub fn scripted(outcomes: impl IntoIterator<Item = Result<u64, String>>) -> Self {
        Self {
            exec_outcomes: outcomes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

fn fail(msg: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ExecutionError(msg.to_string())
}

#[async_trait]
impl Session for RecordingSession {
    async fn begin(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.calls.push(Call::Begin);
        if self.fail_begin || self.in_tx {
            return Err(fail("begin refused"));
        }
        self.in_tx = true;
        Ok(())
    }

    async fn exec(
        &mut self,
        statement: &str,
        _params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.calls.push(Call::Exec(statement.to_string()));
        if self.hang_on_exec {
            std::future::pending::<()>().await;
        }
        match self.exec_outcomes.pop_front().unwrap_or(Ok(1)) {
            Ok(rows) => Ok(ExecResult::new(rows)),
            Err(msg) => Err(fail(&msg)),
        }
    }

    async fn select(
        &mut self,
        statement: &str,
        _params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.calls.push(Call::Select(statement.to_string()));
        Ok(ResultSet::default())
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.calls.push(Call::Commit);
        if self.fail_commit {
            return Err(fail("commit refused"));
        }
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.calls.push(Call::Rollback);
        self.in_tx = false;
        if self.fail_rollback {
            return Err(fail("rollback refused"));
        }
        Ok(())
    }

    fn abandon(&mut self) {
        self.calls.push(Call::Abandon);
        self.in_tx = false;
    }
}
