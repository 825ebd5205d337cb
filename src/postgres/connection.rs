use std::fmt;

use deadpool_postgres::Object;
use tokio::runtime::Handle;

use crate::error::SqlMiddlewareDbError;
use crate::results::{ExecResult, ResultSet};
use crate::types::RowValues;

use super::params::Params;
use super::query::build_result_set;

/// Pooled Postgres client with explicit transaction state.
///
/// Transactions are driven with `BEGIN`/`COMMIT`/`ROLLBACK` over the simple query
/// protocol so the client never has to be borrowed by a `tokio_postgres::Transaction`.
pub struct PgConnection {
    client: Option<Object>,
    in_transaction: bool,
    needs_rollback: bool,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self {
            client: Some(client),
            in_transaction: false,
            needs_rollback: false,
        }
    }

    fn client(&self) -> Result<&Object, SqlMiddlewareDbError> {
        self.client.as_ref().ok_or_else(|| {
            SqlMiddlewareDbError::ConnectionError("postgres client already released".into())
        })
    }

    fn client_mut(&mut self) -> Result<&mut Object, SqlMiddlewareDbError> {
        self.client.as_mut().ok_or_else(|| {
            SqlMiddlewareDbError::ConnectionError("postgres client already released".into())
        })
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn ensure_not_in_tx(&self, ctx: &str) -> Result<(), SqlMiddlewareDbError> {
        if self.in_transaction {
            Err(SqlMiddlewareDbError::ExecutionError(format!(
                "Postgres transaction in progress; operation not permitted ({ctx})"
            )))
        } else {
            Ok(())
        }
    }

    fn ensure_in_tx(&self) -> Result<(), SqlMiddlewareDbError> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(SqlMiddlewareDbError::ExecutionError(
                "Postgres transaction not active".into(),
            ))
        }
    }

    async fn simple(&self, sql: &str, action: &str) -> Result<(), SqlMiddlewareDbError> {
        self.client()?
            .simple_query(sql)
            .await
            .map(|_| ())
            .map_err(|e| {
                SqlMiddlewareDbError::ExecutionError(format!("postgres {action} error: {e}"))
            })
    }

    /// Roll back a transaction left behind by a dropped guard.
    pub(crate) async fn settle_abandoned(&mut self) -> Result<(), SqlMiddlewareDbError> {
        if !self.needs_rollback {
            return Ok(());
        }
        tracing::warn!(
            target: "tx_sequence::postgres",
            "rolling back abandoned postgres transaction"
        );
        self.simple("ROLLBACK", "rollback").await?;
        self.needs_rollback = false;
        Ok(())
    }

    async fn prepare_for_use(&mut self, ctx: &str) -> Result<(), SqlMiddlewareDbError> {
        self.settle_abandoned().await?;
        self.ensure_not_in_tx(ctx)
    }

    /// Begin an explicit transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if starting the transaction fails or one is already active.
    pub async fn begin(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.prepare_for_use("begin").await?;
        // BEGIN may already be on the wire if this future is dropped mid-await
        self.needs_rollback = true;
        let result = self.simple("BEGIN", "begin").await;
        self.needs_rollback = false;
        result?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. On failure the transaction is still considered
    /// open so the caller can roll it back.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the commit fails or no transaction is active.
    pub async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        self.simple("COMMIT", "commit").await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back the open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the rollback fails or no transaction is active.
    pub async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        self.in_transaction = false;
        let result = self.simple("ROLLBACK", "rollback").await;
        if result.is_err() {
            self.needs_rollback = true;
        }
        result
    }

    pub(crate) fn abandon(&mut self) {
        if self.in_transaction {
            self.in_transaction = false;
            self.needs_rollback = true;
        }
    }

    /// Execute a batch of statements atomically.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or the batch fails.
    pub async fn execute_batch(&mut self, query: &str) -> Result<(), SqlMiddlewareDbError> {
        self.prepare_for_use("execute batch").await?;
        let client = self.client_mut()?;
        let tx = client.transaction().await?;
        tx.batch_execute(query).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Execute a DML statement outside a transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or the statement fails.
    pub async fn execute(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.prepare_for_use("execute").await?;
        self.run_exec(query, params).await
    }

    /// Execute a SELECT outside a transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or the query fails.
    pub async fn execute_select(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.prepare_for_use("execute select").await?;
        self.run_select(query, params).await
    }

    /// Execute a DML statement inside the open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if no transaction is active or the statement fails.
    pub async fn execute_in_tx(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        self.run_exec(query, params).await
    }

    /// Execute a SELECT inside the open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if no transaction is active or the query fails.
    pub async fn execute_select_in_tx(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        self.run_select(query, params).await
    }

    // Postgres has no connection-level insert id; callers use RETURNING instead.
    async fn run_exec(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        let client = self.client()?;
        let stmt = client.prepare_cached(query).await?;
        let converted = Params::convert(params);
        let affected = client.execute(&stmt, converted.as_refs()).await?;
        Ok(ExecResult::new(affected))
    }

    async fn run_select(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let client = self.client()?;
        let stmt = client.prepare_cached(query).await?;
        let converted = Params::convert(params);
        let rows = client.query(&stmt, converted.as_refs()).await?;
        build_result_set(&stmt, &rows)
    }
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("in_transaction", &self.in_transaction)
            .field("needs_rollback", &self.needs_rollback)
            .finish_non_exhaustive()
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        if !(self.in_transaction || self.needs_rollback) {
            return;
        }
        let Some(client) = self.client.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = client.simple_query("ROLLBACK").await {
                        tracing::error!(
                            target: "tx_sequence::postgres",
                            error = %err,
                            "rollback of abandoned postgres transaction failed on drop"
                        );
                        // keep a connection stuck in a transaction out of the pool
                        drop(Object::take(client));
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    target: "tx_sequence::postgres",
                    "no runtime to roll back abandoned transaction; detaching connection from pool"
                );
                drop(Object::take(client));
            }
        }
    }
}
