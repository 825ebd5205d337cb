#[cfg(feature = "postgres")]
use crate::postgres::PgConnection;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteConnection;

use super::types::MiddlewarePool;
use crate::error::SqlMiddlewareDbError;
use crate::translation::PlaceholderStyle;

/// A connection checked out of a [`MiddlewarePool`].
///
/// Dropping it returns the connection to its pool; an open transaction is
/// rolled back first.
pub enum MiddlewarePoolConnection {
    #[cfg(feature = "postgres")]
    Postgres {
        conn: PgConnection,
        translate_placeholders: bool,
    },
    #[cfg(feature = "sqlite")]
    Sqlite {
        conn: SqliteConnection,
        translate_placeholders: bool,
    },
}

impl std::fmt::Debug for MiddlewarePoolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres { conn, .. } => f.debug_tuple("Postgres").field(conn).finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite { conn, .. } => f.debug_tuple("Sqlite").field(conn).finish(),
        }
    }
}

impl MiddlewarePool {
    /// Get a connection from the pool
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::PoolErrorPostgres` or `SqlMiddlewareDbError::ConnectionError`
    /// if the pool fails to provide a connection.
    pub async fn get_connection(
        &self,
        translate_placeholders: bool,
    ) -> Result<MiddlewarePoolConnection, SqlMiddlewareDbError> {
        match self {
            #[cfg(feature = "postgres")]
            MiddlewarePool::Postgres(pool) => {
                let client = pool.get().await?;
                Ok(MiddlewarePoolConnection::Postgres {
                    conn: PgConnection::new(client),
                    translate_placeholders,
                })
            }
            #[cfg(feature = "sqlite")]
            MiddlewarePool::Sqlite(pool) => {
                let conn = pool.get_owned().await?;
                Ok(MiddlewarePoolConnection::Sqlite {
                    conn: SqliteConnection::new(conn),
                    translate_placeholders,
                })
            }
        }
    }
}

impl MiddlewarePoolConnection {
    /// Whether this connection translates placeholders unless told otherwise.
    #[must_use]
    pub fn translation_default(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres {
                translate_placeholders,
                ..
            } => *translate_placeholders,
            #[cfg(feature = "sqlite")]
            Self::Sqlite {
                translate_placeholders,
                ..
            } => *translate_placeholders,
        }
    }

    /// The placeholder syntax the backend expects.
    #[must_use]
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres { .. } => PlaceholderStyle::Postgres,
            #[cfg(feature = "sqlite")]
            Self::Sqlite { .. } => PlaceholderStyle::Sqlite,
        }
    }

    /// Whether a transaction is open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres { conn, .. } => conn.in_transaction(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite { conn, .. } => conn.in_transaction(),
        }
    }

    /// Run synchronous `SQLite` work against the raw `rusqlite::Connection`.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::Unimplemented`] when the connection is not `SQLite`.
    #[cfg(feature = "sqlite")]
    pub async fn with_sqlite_connection<F, R>(&mut self, func: F) -> Result<R, SqlMiddlewareDbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlMiddlewareDbError> + Send + 'static,
        R: Send + 'static,
    {
        match self {
            Self::Sqlite { conn, .. } => conn.with_connection(func).await,
            #[allow(unreachable_patterns)]
            _ => Err(SqlMiddlewareDbError::Unimplemented(
                "with_sqlite_connection is only available for SQLite connections".to_string(),
            )),
        }
    }
}
