use crate::error::SqlMiddlewareDbError;
use crate::results::{ExecResult, ResultSet};
use crate::session::Session;
use crate::types::RowValues;

/// A transaction in progress on a borrowed [`Session`].
///
/// `commit` and `rollback` consume the guard. A guard dropped without either
/// (early return, `?`, panic, or a cancelled future) tells the session to
/// abandon the transaction, and the session rolls it back.
#[must_use = "dropping a Tx without commit or rollback rolls the transaction back"]
pub struct Tx<'s, S: Session + ?Sized> {
    session: &'s mut S,
    finished: bool,
}

impl<'s, S: Session + ?Sized> Tx<'s, S> {
    /// Begin a transaction on `session`.
    ///
    /// # Errors
    /// Returns the backend error if the transaction cannot be started.
    pub async fn begin(session: &'s mut S) -> Result<Self, SqlMiddlewareDbError> {
        session.begin().await?;
        Ok(Self {
            session,
            finished: false,
        })
    }

    /// Execute a DML statement inside this transaction.
    ///
    /// # Errors
    /// Returns the backend error for the statement.
    pub async fn exec(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.session.exec(statement, params).await
    }

    /// Run a query inside this transaction.
    ///
    /// # Errors
    /// Returns the backend error for the query.
    pub async fn select(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.session.select(statement, params).await
    }

    /// Commit the transaction.
    ///
    /// The guard is finished even when the commit fails; the session then still
    /// holds the open transaction and the caller decides whether to roll back.
    ///
    /// # Errors
    /// Returns the backend commit error.
    pub async fn commit(mut self) -> Result<(), SqlMiddlewareDbError> {
        let result = self.session.commit().await;
        self.finished = true;
        result
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    /// Returns the backend rollback error.
    pub async fn rollback(mut self) -> Result<(), SqlMiddlewareDbError> {
        let result = self.session.rollback().await;
        self.finished = true;
        result
    }
}

impl<S: Session + ?Sized> Drop for Tx<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                target: "tx_sequence::transaction",
                "transaction guard dropped without commit or rollback"
            );
            self.session.abandon();
        }
    }
}
