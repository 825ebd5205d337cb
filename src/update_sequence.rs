//! Run dependent writes as one all-or-nothing unit.
//!
//! Each [`UpdateStep`] carries the number of rows it must affect. The sequence
//! commits only when every step runs cleanly and reports exactly that count;
//! any other outcome rolls the whole transaction back and reports which step
//! failed and how.
//!
//! ```rust,no_run
//! use tx_sequence::prelude::*;
//!
//! # async fn demo(cap: &ConfigAndPool) -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = cap.get_connection().await?;
//! let debit = UpdateStep::new(
//!     "UPDATE accounts SET balance = balance - ?1 WHERE id = ?2",
//!     vec![RowValues::Int(100), RowValues::Int(1)],
//!     1,
//! )?;
//! let credit = UpdateStep::new(
//!     "UPDATE accounts SET balance = balance + ?1 WHERE id = ?2",
//!     vec![RowValues::Int(100), RowValues::Int(2)],
//!     1,
//! )?;
//! match run_update_sequence(&mut conn, &debit, &credit).await {
//!     Ok(outcome) => assert_eq!(outcome.rows_affected, vec![1, 1]),
//!     Err(err) => eprintln!("transfer rolled back: {}", err.tag()),
//! }
//! # Ok(()) }
//! ```

use tracing::Instrument;

use crate::error::{SequenceError, SqlMiddlewareDbError};
use crate::query::QueryAndParams;
use crate::session::Session;
use crate::transaction::Tx;
use crate::types::RowValues;

/// One statement of a sequence together with the row count it must affect.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStep {
    statement: String,
    params: Vec<RowValues>,
    expected_rows: u64,
}

impl UpdateStep {
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ParameterError` if `statement` is blank.
    pub fn new(
        statement: impl Into<String>,
        params: Vec<RowValues>,
        expected_rows: u64,
    ) -> Result<Self, SqlMiddlewareDbError> {
        let statement = statement.into();
        if statement.trim().is_empty() {
            return Err(SqlMiddlewareDbError::ParameterError(
                "update step statement is empty".into(),
            ));
        }
        Ok(Self {
            statement,
            params,
            expected_rows,
        })
    }

    /// Build a step from an already bound query, e.g. the output of `bind_named`.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ParameterError` if the query text is blank.
    pub fn from_query_and_params(
        query: QueryAndParams,
        expected_rows: u64,
    ) -> Result<Self, SqlMiddlewareDbError> {
        Self::new(query.query, query.params, expected_rows)
    }

    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }

    #[must_use]
    pub fn expected_rows(&self) -> u64 {
        self.expected_rows
    }
}

/// Result of a committed sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOutcome {
    /// Rows affected by each step, in order.
    pub rows_affected: Vec<u64>,
}

/// Run two dependent steps in one transaction.
///
/// # Errors
/// Returns a [`SequenceError`] tagged with the failing stage; the transaction has
/// been rolled back (or the rollback failure is attached) by the time it returns.
pub async fn run_update_sequence<S: Session + ?Sized>(
    session: &mut S,
    first: &UpdateStep,
    second: &UpdateStep,
) -> Result<SequenceOutcome, SequenceError> {
    run_steps(session, &[first, second]).await
}

/// Run any number of steps in one transaction, in order.
///
/// # Errors
/// Returns `SequenceError::InvalidSequence` for an empty list, otherwise the same
/// failures as [`run_update_sequence`] with 1-based step numbers.
pub async fn run_update_steps<S: Session + ?Sized>(
    session: &mut S,
    steps: &[UpdateStep],
) -> Result<SequenceOutcome, SequenceError> {
    let steps: Vec<&UpdateStep> = steps.iter().collect();
    run_steps(session, &steps).await
}

async fn run_steps<S: Session + ?Sized>(
    session: &mut S,
    steps: &[&UpdateStep],
) -> Result<SequenceOutcome, SequenceError> {
    if steps.is_empty() {
        return Err(SequenceError::InvalidSequence(
            "at least one update step is required".into(),
        ));
    }

    let span = tracing::info_span!("update_sequence", steps = steps.len());
    async move {
        let mut tx = match Tx::begin(&mut *session).await {
            Ok(tx) => tx,
            Err(source) => {
                let err = SequenceError::Begin { source };
                tracing::warn!(tag = %err.tag(), error = %err, "update sequence failed");
                return Err(err);
            }
        };

        let mut rows_affected = Vec::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            let step_no = idx + 1;
            let failure = match tx.exec(step.statement(), step.params()).await {
                Ok(res) if res.rows_affected == step.expected_rows() => {
                    tracing::debug!(
                        step = step_no,
                        rows_affected = res.rows_affected,
                        "step applied"
                    );
                    rows_affected.push(res.rows_affected);
                    continue;
                }
                Ok(res) => SequenceError::StepCountMismatch {
                    step: step_no,
                    expected: step.expected_rows(),
                    actual: res.rows_affected,
                    rollback: None,
                },
                Err(source) => SequenceError::StepExec {
                    step: step_no,
                    source,
                    rollback: None,
                },
            };
            tracing::warn!(tag = %failure.tag(), error = %failure, "update sequence failed");
            let rollback = tx.rollback().await;
            return Err(with_rollback_outcome(failure, rollback));
        }

        if let Err(source) = tx.commit().await {
            let failure = SequenceError::Commit {
                source,
                rollback: None,
            };
            tracing::warn!(tag = %failure.tag(), error = %failure, "update sequence failed");
            // leave the connection outside any transaction
            let rollback = session.rollback().await;
            return Err(with_rollback_outcome(failure, rollback));
        }

        tracing::info!(rows_affected = ?rows_affected, "update sequence committed");
        Ok(SequenceOutcome { rows_affected })
    }
    .instrument(span)
    .await
}

fn with_rollback_outcome(
    failure: SequenceError,
    rollback: Result<(), SqlMiddlewareDbError>,
) -> SequenceError {
    match rollback {
        Ok(()) => failure,
        Err(err) => {
            tracing::error!(tag = %failure.tag(), error = %err, "rollback failed");
            failure.attach_rollback(err)
        }
    }
}
