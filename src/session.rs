use std::future::Future;

use async_trait::async_trait;

use crate::error::SqlMiddlewareDbError;
use crate::pool::MiddlewarePoolConnection;
use crate::results::{ExecResult, ResultSet};
use crate::transaction::Tx;
use crate::translation::TranslationMode;
use crate::types::RowValues;

#[cfg(feature = "sqlite")]
use crate::sqlite::Params as SqliteParams;

/// An open database connection that can host one transaction at a time.
///
/// The session is owned by the caller; transactional code borrows it mutably and
/// never opens or closes it. `exec` and `select` run inside the active
/// transaction and fail when none is open.
#[async_trait]
pub trait Session: Send {
    /// Start a transaction. Fails if one is already active.
    async fn begin(&mut self) -> Result<(), SqlMiddlewareDbError>;

    /// Run one DML statement inside the active transaction.
    async fn exec(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError>;

    /// Run a query inside the active transaction.
    async fn select(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError>;

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError>;

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError>;

    /// A transaction guard was dropped without commit or rollback.
    ///
    /// Implementations must roll that transaction back before the session is used
    /// again, or when the session itself is dropped.
    fn abandon(&mut self);
}

/// Convenience for opening a [`Tx`] on any sized session.
pub trait SessionExt: Session + Sized {
    /// Begin a transaction and wrap it in a guard borrowing this session.
    fn transaction(
        &mut self,
    ) -> impl Future<Output = Result<Tx<'_, Self>, SqlMiddlewareDbError>> + Send;
}

impl<S: Session> SessionExt for S {
    fn transaction(
        &mut self,
    ) -> impl Future<Output = Result<Tx<'_, Self>, SqlMiddlewareDbError>> + Send {
        Tx::begin(self)
    }
}

#[async_trait]
impl Session for MiddlewarePoolConnection {
    async fn begin(&mut self) -> Result<(), SqlMiddlewareDbError> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.begin().await,
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => conn.begin().await,
        }
    }

    async fn exec(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, SqlMiddlewareDbError> {
        let sql = self
            .translate(statement, TranslationMode::PoolDefault)
            .into_owned();
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => {
                conn.execute_in_tx(&sql, params).await
            }
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => {
                conn.execute_in_tx(&sql, SqliteParams::convert(params).0)
                    .await
            }
        }
    }

    async fn select(
        &mut self,
        statement: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        let sql = self
            .translate(statement, TranslationMode::PoolDefault)
            .into_owned();
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => {
                conn.execute_select_in_tx(&sql, params).await
            }
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => {
                conn.execute_select_in_tx(&sql, SqliteParams::convert(params).0)
                    .await
            }
        }
    }

    async fn commit(&mut self) -> Result<(), SqlMiddlewareDbError> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.commit().await,
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => conn.commit().await,
        }
    }

    async fn rollback(&mut self) -> Result<(), SqlMiddlewareDbError> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.rollback().await,
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => conn.rollback().await,
        }
    }

    fn abandon(&mut self) {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePoolConnection::Postgres { conn, .. } => conn.abandon(),
            #[cfg(feature = "sqlite")]
            MiddlewarePoolConnection::Sqlite { conn, .. } => conn.abandon(),
        }
    }
}
