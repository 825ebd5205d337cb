use deadpool_postgres::{Config as PgConfig, PoolConfig};
use tokio_postgres::NoTls;

use crate::error::SqlMiddlewareDbError;
use crate::pool::{ConfigAndPool, MiddlewarePool};
use crate::types::DatabaseType;

/// Options for configuring a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub config: PgConfig,
    pub translate_placeholders: bool,
    pub max_connections: Option<usize>,
}

impl PostgresOptions {
    #[must_use]
    pub fn new(config: PgConfig) -> Self {
        Self {
            config,
            translate_placeholders: false,
            max_connections: None,
        }
    }

    #[must_use]
    pub fn with_translation(mut self, translate_placeholders: bool) -> Self {
        self.translate_placeholders = translate_placeholders;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }
}

fn validate(pg_config: &PgConfig) -> Result<(), SqlMiddlewareDbError> {
    // a connection URL carries everything else
    if pg_config.url.is_some() {
        return Ok(());
    }
    let missing = [
        ("dbname", pg_config.dbname.is_none()),
        ("host", pg_config.host.is_none()),
        ("port", pg_config.port.is_none()),
        ("user", pg_config.user.is_none()),
    ];
    if let Some((field, _)) = missing.iter().find(|(_, is_missing)| *is_missing) {
        return Err(SqlMiddlewareDbError::ConfigError(format!(
            "{field} is required"
        )));
    }
    Ok(())
}

impl ConfigAndPool {
    /// Asynchronous initializer for `ConfigAndPool` with Postgres.
    ///
    /// The pool connects lazily; the first checkout surfaces connection failures.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` if required config fields are missing or
    /// `SqlMiddlewareDbError::ConnectionError` if pool creation fails.
    #[allow(clippy::unused_async)]
    pub async fn new_postgres(opts: PostgresOptions) -> Result<Self, SqlMiddlewareDbError> {
        let PostgresOptions {
            mut config,
            translate_placeholders,
            max_connections,
        } = opts;
        validate(&config)?;

        if let Some(max_size) = max_connections {
            config.pool = Some(PoolConfig::new(max_size));
        }

        let pg_pool = config
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                SqlMiddlewareDbError::ConnectionError(format!(
                    "Failed to create Postgres pool: {e}"
                ))
            })?;

        tracing::info!(
            target: "tx_sequence::postgres",
            host = ?config.host,
            dbname = ?config.dbname,
            "postgres pool ready"
        );

        Ok(ConfigAndPool {
            pool: MiddlewarePool::Postgres(pg_pool),
            db_type: DatabaseType::Postgres,
            translate_placeholders,
        })
    }
}
