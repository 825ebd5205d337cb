use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::SqlMiddlewareDbError;
use crate::pool::MiddlewarePoolConnection;
use crate::results::{CustomDbRow, ExecResult, ResultSet};
use crate::translation::{TranslationMode, translate_placeholders};
use crate::types::RowValues;

#[cfg(feature = "sqlite")]
use crate::sqlite::Params as SqliteParams;
#[cfg(feature = "sqlite")]
use crate::types::{ConversionMode, convert_sql_params};

/// Backend-independent statement execution outside of a transaction.
#[async_trait]
pub trait AsyncDatabaseExecutor {
    /// Executes a batch of SQL statements atomically. No parameters are supported.
    async fn execute_batch(&mut self, query: &str) -> Result<(), SqlMiddlewareDbError>;

    /// Executes a single SELECT statement and returns the result set.
    async fn execute_select(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError>;

    /// Executes a single DML statement and returns the number of rows affected.
    async fn execute_dml(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlMiddlewareDbError>;
}

impl MiddlewarePoolConnection {
    /// Translate `sql` into this connection's placeholder style when `mode` asks for it.
    #[must_use]
    pub fn translate<'q>(&self, sql: &'q str, mode: TranslationMode) -> Cow<'q, str> {
        translate_placeholders(
            sql,
            self.placeholder_style(),
            mode.resolve(self.translation_default()),
        )
    }

    /// Executes a batch of statements atomically.
    ///
    /// # Errors
    /// Returns an error if a transaction is active or the database rejects the batch.
    pub async fn execute_batch(&mut self, query: &str) -> Result<(), SqlMiddlewareDbError> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.execute_batch(query).await,
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => conn.execute_batch(query).await,
        }
    }

    /// Executes a SELECT and returns every row.
    ///
    /// # Errors
    /// Returns an error if a transaction is active or the query fails.
    pub async fn execute_select(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let sql = self.translate(query, TranslationMode::PoolDefault).into_owned();
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => {
                conn.execute_select(&sql, params).await
            }
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => {
                let converted =
                    convert_sql_params::<SqliteParams>(params, ConversionMode::Query)?;
                conn.execute_select(&sql, converted.0).await
            }
        }
    }

    /// Executes a DML statement and reports rows affected plus the last insert id
    /// where the backend provides one.
    ///
    /// # Errors
    /// Returns an error if a transaction is active or the statement fails.
    pub async fn execute(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        let sql = self.translate(query, TranslationMode::PoolDefault).into_owned();
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.execute(&sql, params).await,
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => {
                let converted =
                    convert_sql_params::<SqliteParams>(params, ConversionMode::Execute)?;
                conn.execute(&sql, converted.0).await
            }
        }
    }

    /// Executes a DML statement and returns the number of rows affected.
    ///
    /// # Errors
    /// Returns an error if a transaction is active, the statement fails, or the count
    /// does not fit in `usize`.
    pub async fn execute_dml(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlMiddlewareDbError> {
        let result = self.execute(query, params).await?;
        usize::try_from(result.rows_affected).map_err(|e| {
            SqlMiddlewareDbError::ExecutionError(format!("affected rows conversion error: {e}"))
        })
    }

    /// Executes a SELECT and returns only its first row, if any.
    ///
    /// # Errors
    /// Returns an error if a transaction is active or the query fails.
    pub async fn select_one(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, SqlMiddlewareDbError> {
        Ok(self.execute_select(query, params).await?.into_first())
    }
}

#[async_trait]
impl AsyncDatabaseExecutor for MiddlewarePoolConnection {
    async fn execute_batch(&mut self, query: &str) -> Result<(), SqlMiddlewareDbError> {
        MiddlewarePoolConnection::execute_batch(self, query).await
    }

    async fn execute_select(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        MiddlewarePoolConnection::execute_select(self, query, params).await
    }

    async fn execute_dml(
        &mut self,
        query: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlMiddlewareDbError> {
        MiddlewarePoolConnection::execute_dml(self, query, params).await
    }
}
