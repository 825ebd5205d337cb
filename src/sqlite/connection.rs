use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::ToSql;

use crate::error::SqlMiddlewareDbError;
use crate::results::{ExecResult, ResultSet};

use super::config::{SharedSqliteConnection, SqlitePooledConnection};
use super::query::build_result_set;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// Connection wrapper backed by a bb8 pooled `SQLite` connection.
///
/// Tracks whether this wrapper opened a transaction, and whether a transaction was
/// abandoned and still needs a `ROLLBACK` before the connection is used again.
pub struct SqliteConnection {
    pub(crate) conn: SqlitePooledConnection,
    pub(crate) in_transaction: bool,
    pub(crate) needs_rollback: bool,
}

impl SqliteConnection {
    pub(crate) fn new(conn: SqlitePooledConnection) -> Self {
        Self {
            conn,
            in_transaction: false,
            needs_rollback: false,
        }
    }

    pub(crate) fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&*self.conn)
    }

    /// Whether a transaction opened through this wrapper is still active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run synchronous work against the raw `rusqlite::Connection` on the blocking pool.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or `func` fails.
    pub async fn with_connection<F, R>(&mut self, func: F) -> Result<R, SqlMiddlewareDbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlMiddlewareDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.prepare_for_use("with connection").await?;
        run_blocking(self.conn_handle(), func).await
    }

    fn ensure_not_in_tx(&self, ctx: &str) -> Result<(), SqlMiddlewareDbError> {
        if self.in_transaction {
            Err(SqlMiddlewareDbError::ExecutionError(format!(
                "SQLite transaction in progress; operation not permitted ({ctx})"
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
                "SQLite transaction not active".into(),
            ))
        }
    }

    /// Roll back a transaction left behind by a dropped guard.
    pub(crate) async fn settle_abandoned(&mut self) -> Result<(), SqlMiddlewareDbError> {
        if !self.needs_rollback {
            return Ok(());
        }
        tracing::warn!(
            target: "tx_sequence::sqlite",
            "rolling back abandoned sqlite transaction"
        );
        run_blocking(self.conn_handle(), |guard| {
            if guard.is_autocommit() {
                Ok(())
            } else {
                rollback_with_busy_retries(guard)
            }
        })
        .await?;
        self.needs_rollback = false;
        Ok(())
    }

    async fn prepare_for_use(&mut self, ctx: &str) -> Result<(), SqlMiddlewareDbError> {
        self.settle_abandoned().await?;
        self.ensure_not_in_tx(ctx)
    }

    /// Begin a transaction, transitioning this connection into transactional mode.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the transaction cannot be started or is already active.
    pub async fn begin(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.prepare_for_use("begin").await?;
        // the blocking task still runs BEGIN if this future is dropped mid-await
        self.needs_rollback = true;
        let result = run_blocking(self.conn_handle(), |guard| {
            guard
                .execute_batch("BEGIN")
                .map_err(SqlMiddlewareDbError::SqliteError)
        })
        .await;
        self.needs_rollback = false;
        result?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit an open transaction. On failure the transaction stays open so the
    /// caller can roll it back.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if committing fails or no transaction is active.
    pub async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        run_blocking(self.conn_handle(), |guard| {
            guard
                .execute_batch("COMMIT")
                .map_err(SqlMiddlewareDbError::SqliteError)
        })
        .await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Roll back an open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if rolling back fails or no transaction is active.
    pub async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        self.in_transaction = false;
        let result = run_blocking(self.conn_handle(), |guard| {
            if guard.is_autocommit() {
                // the engine already rolled back (e.g. after a failed COMMIT)
                Ok(())
            } else {
                rollback_with_busy_retries(guard)
            }
        })
        .await;
        if result.is_err() {
            self.needs_rollback = true;
        }
        result
    }

    /// Mark the active transaction as abandoned; it is rolled back on next use or drop.
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
        let sql_owned = query.to_owned();
        run_blocking(self.conn_handle(), move |guard| {
            let tx = guard
                .transaction()
                .map_err(SqlMiddlewareDbError::SqliteError)?;
            tx.execute_batch(&sql_owned)
                .map_err(SqlMiddlewareDbError::SqliteError)?;
            tx.commit().map_err(SqlMiddlewareDbError::SqliteError)
        })
        .await
    }

    /// Execute a DML statement outside a transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or the statement fails.
    pub async fn execute(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.prepare_for_use("execute").await?;
        run_exec(self.conn_handle(), query.to_owned(), params).await
    }

    /// Execute a SELECT outside a transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if a transaction is active or the query fails.
    pub async fn execute_select(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.prepare_for_use("execute select").await?;
        run_select(self.conn_handle(), query.to_owned(), params).await
    }

    /// Execute a DML statement inside the open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if no transaction is active or the statement fails.
    pub async fn execute_in_tx(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        run_exec(self.conn_handle(), query.to_owned(), params).await
    }

    /// Execute a SELECT inside the open transaction.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if no transaction is active or the query fails.
    pub async fn execute_select_in_tx(
        &mut self,
        query: &str,
        params: Vec<Value>,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.ensure_in_tx()?;
        run_select(self.conn_handle(), query.to_owned(), params).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_transaction", &self.in_transaction)
            .field("needs_rollback", &self.needs_rollback)
            .finish_non_exhaustive()
    }
}

/// Dropping a wrapper with an open or abandoned transaction issues one `ROLLBACK`
/// inline, without busy retries. If that fails, or an in-flight blocking task holds
/// the lock, the pool's `has_broken` check discards the connection instead.
impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !(self.in_transaction || self.needs_rollback) {
            return;
        }
        if let Ok(guard) = self.conn.try_lock()
            && !guard.is_autocommit()
            && let Err(err) = guard.execute_batch("ROLLBACK")
        {
            tracing::error!(
                target: "tx_sequence::sqlite",
                error = %err,
                "rollback of abandoned sqlite transaction failed on drop"
            );
        }
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlMiddlewareDbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlMiddlewareDbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| {
        SqlMiddlewareDbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
    })?
}

async fn run_exec(
    conn: SharedSqliteConnection,
    sql: String,
    params: Vec<Value>,
) -> Result<ExecResult, SqlMiddlewareDbError> {
    run_blocking(conn, move |guard| {
        let rowid_before = guard.last_insert_rowid();
        let mut stmt = guard
            .prepare_cached(&sql)
            .map_err(SqlMiddlewareDbError::SqliteError)?;
        let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
        let affected = stmt
            .execute(&refs[..])
            .map_err(SqlMiddlewareDbError::SqliteError)?;
        drop(stmt);

        let result = ExecResult::new(affected as u64);
        let rowid_after = guard.last_insert_rowid();
        if rowid_after != rowid_before {
            Ok(result.with_last_insert_id(rowid_after))
        } else {
            Ok(result)
        }
    })
    .await
}

async fn run_select(
    conn: SharedSqliteConnection,
    sql: String,
    params: Vec<Value>,
) -> Result<ResultSet, SqlMiddlewareDbError> {
    run_blocking(conn, move |guard| {
        let mut stmt = guard
            .prepare_cached(&sql)
            .map_err(SqlMiddlewareDbError::SqliteError)?;
        build_result_set(&mut stmt, &params)
    })
    .await
}

pub(crate) fn rollback_with_busy_retries(
    guard: &mut rusqlite::Connection,
) -> Result<(), SqlMiddlewareDbError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match guard.execute_batch("ROLLBACK") {
            Ok(()) => return Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            Err(err) => return Err(SqlMiddlewareDbError::SqliteError(err)),
        }
    }

    Err(SqlMiddlewareDbError::ExecutionError(
        "rollback retries exhausted".into(),
    ))
}
