//! JSON-driven pool configuration.
//!
//! ```rust
//! use tx_sequence::config::DatabaseConfig;
//!
//! let cfg = DatabaseConfig::from_json_str(
//!     r#"{ "db_type": "sqlite", "path": "accounts.db", "translate_placeholders": true }"#,
//! )
//! .unwrap();
//! assert_eq!(cfg.path.as_deref(), Some("accounts.db"));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SqlMiddlewareDbError;
use crate::pool::ConfigAndPool;
use crate::types::DatabaseType;

/// Connection settings for either backend.
///
/// `SQLite` reads `path`; Postgres reads `url` or the host/port/dbname/user/password fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub db_type: Option<DatabaseType>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable whose value replaces `password` when set.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub translate_placeholders: bool,
}

impl DatabaseConfig {
    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, SqlMiddlewareDbError> {
        serde_json::from_str(json)
            .map_err(|e| SqlMiddlewareDbError::ConfigError(format!("invalid config JSON: {e}")))
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlMiddlewareDbError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlMiddlewareDbError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// The password after applying the `password_env` override.
    #[must_use]
    pub fn resolved_password(&self) -> Option<String> {
        self.password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.password.clone())
    }

    fn db_type(&self) -> Result<DatabaseType, SqlMiddlewareDbError> {
        self.db_type
            .ok_or_else(|| SqlMiddlewareDbError::ConfigError("db_type is required".into()))
    }

    #[cfg(feature = "sqlite")]
    fn sqlite_options(&self) -> Result<crate::sqlite::SqliteOptions, SqlMiddlewareDbError> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| SqlMiddlewareDbError::ConfigError("path is required".into()))?;
        let mut opts =
            crate::sqlite::SqliteOptions::new(path).with_translation(self.translate_placeholders);
        opts.max_connections = self.max_connections;
        Ok(opts)
    }

    #[cfg(feature = "postgres")]
    fn postgres_options(&self) -> crate::postgres::PostgresOptions {
        let mut pg = deadpool_postgres::Config::new();
        pg.url.clone_from(&self.url);
        pg.host.clone_from(&self.host);
        pg.port = self.port;
        pg.dbname.clone_from(&self.dbname);
        pg.user.clone_from(&self.user);
        pg.password = self.resolved_password();
        let mut opts =
            crate::postgres::PostgresOptions::new(pg).with_translation(self.translate_placeholders);
        if let Some(max) = self.max_connections {
            opts = opts.with_max_connections(max as usize);
        }
        opts
    }
}

impl ConfigAndPool {
    /// Build the pool described by a [`DatabaseConfig`].
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` for missing fields, or whatever the
    /// backend initializer reports.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, SqlMiddlewareDbError> {
        match config.db_type()? {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => ConfigAndPool::new_sqlite(config.sqlite_options()?).await,
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => ConfigAndPool::new_postgres(config.postgres_options()).await,
        }
    }
}
