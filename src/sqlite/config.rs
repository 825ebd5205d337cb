use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio::sync::Mutex;

use crate::error::SqlMiddlewareDbError;
use crate::pool::{ConfigAndPool, MiddlewarePool};
use crate::types::DatabaseType;

use super::connection::run_blocking;

pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;
pub type SqlitePooledConnection = PooledConnection<'static, SqliteManager>;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for configuring a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub translate_placeholders: bool,
    pub max_connections: Option<u32>,
    pub busy_timeout: Duration,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            translate_placeholders: false,
            max_connections: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_translation(mut self, translate_placeholders: bool) -> Self {
        self.translate_placeholders = translate_placeholders;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn translation(mut self, translate_placeholders: bool) -> Self {
        self.opts.translate_placeholders = translate_placeholders;
        self
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.opts.max_connections = Some(max_connections);
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a `ConfigAndPool` for `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqlMiddlewareDbError` if pool creation or the initial smoke test fails.
    pub async fn build(self) -> Result<ConfigAndPool, SqlMiddlewareDbError> {
        ConfigAndPool::new_sqlite(self.finish()).await
    }
}

/// bb8 manager for `SQLite` connections.
///
/// Each connection sits behind a mutex so blocking work can be moved onto tokio's
/// blocking pool while the async side keeps ownership.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    busy_timeout: Duration,
}

impl SqliteManager {
    #[must_use]
    pub fn new(db_path: String, busy_timeout: Duration) -> Self {
        Self {
            db_path,
            busy_timeout,
        }
    }

    fn is_memory(&self) -> bool {
        self.db_path == ":memory:" || self.db_path.contains("mode=memory")
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlMiddlewareDbError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        let wal = !self.is_memory();
        async move {
            let conn = tokio::task::spawn_blocking(move || {
                let conn = rusqlite::Connection::open(&path)?;
                conn.busy_timeout(busy_timeout)?;
                if wal {
                    let _mode: String =
                        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                }
                Ok::<_, SqlMiddlewareDbError>(conn)
            })
            .await
            .map_err(|e| {
                SqlMiddlewareDbError::ConnectionError(format!("sqlite open join error: {e}"))
            })??;
            tracing::debug!(target: "tx_sequence::sqlite", "sqlite connection opened");
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move {
            run_blocking(handle, |guard| {
                if !guard.is_autocommit() {
                    return Err(SqlMiddlewareDbError::ConnectionError(
                        "pooled sqlite connection is inside a transaction".into(),
                    ));
                }
                guard
                    .query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(SqlMiddlewareDbError::SqliteError)
            })
            .await
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        // A connection still inside a transaction must never go back to the pool.
        match conn.try_lock() {
            Ok(guard) => !guard.is_autocommit(),
            Err(_) => true,
        }
    }
}

impl ConfigAndPool {
    #[must_use]
    pub fn sqlite_builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Asynchronous initializer for `ConfigAndPool` with `SQLite` using bb8.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConnectionError` if pool creation or the connection test fails.
    pub async fn new_sqlite(opts: SqliteOptions) -> Result<Self, SqlMiddlewareDbError> {
        let manager = SqliteManager::new(opts.db_path.clone(), opts.busy_timeout);
        let mut builder = Pool::builder();
        if opts.db_path == ":memory:" {
            // every connection to a plain `:memory:` path is a separate database
            builder = builder.max_size(1);
        } else if let Some(max) = opts.max_connections {
            builder = builder.max_size(max);
        }
        let pool = builder.build(manager).await?;

        {
            let conn = pool.get().await?;
            let handle = Arc::clone(&*conn);
            run_blocking(handle, |guard| {
                guard
                    .query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(SqlMiddlewareDbError::SqliteError)
            })
            .await?;
        }

        tracing::info!(
            target: "tx_sequence::sqlite",
            db_path = %opts.db_path,
            "sqlite pool ready"
        );

        Ok(ConfigAndPool {
            pool: MiddlewarePool::Sqlite(pool),
            db_type: DatabaseType::Sqlite,
            translate_placeholders: opts.translate_placeholders,
        })
    }
}
