pub mod connection;
pub mod types;

pub use connection::MiddlewarePoolConnection;
#[cfg(feature = "sqlite")]
pub use types::SqlitePool;
pub use types::MiddlewarePool;

use crate::error::SqlMiddlewareDbError;
use crate::types::DatabaseType;

/// Configuration and connection pool for a database
///
/// Built by `ConfigAndPool::new_postgres`, `ConfigAndPool::new_sqlite`, or
/// `ConfigAndPool::from_config`. Cloning shares the underlying pool.
#[derive(Clone, Debug)]
pub struct ConfigAndPool {
    /// The connection pool
    pub pool: MiddlewarePool,
    /// The database type
    pub db_type: DatabaseType,
    /// Whether connections from this pool translate placeholders by default
    pub translate_placeholders: bool,
}

impl ConfigAndPool {
    /// Check a connection out of the pool.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if the pool cannot provide a connection.
    pub async fn get_connection(&self) -> Result<MiddlewarePoolConnection, SqlMiddlewareDbError> {
        self.pool.get_connection(self.translate_placeholders).await
    }
}
