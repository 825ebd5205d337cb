//! Atomic multi-step update sequences over pooled `SQLite` and Postgres sessions.
//!
//! Build a [`ConfigAndPool`], check out a connection, and hand it to
//! [`run_update_sequence`] together with two [`UpdateStep`]s. Both steps commit
//! together only when each affects exactly the number of rows it declares.

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("enable at least one of the `postgres` or `sqlite` features");

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod named;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod session;
pub mod transaction;
pub mod translation;
pub mod types;
pub mod update_sequence;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::DatabaseConfig;
pub use error::{FailureTag, SequenceError, SqlMiddlewareDbError};
pub use executor::AsyncDatabaseExecutor;
pub use named::{NamedParams, bind_named};
pub use pool::{ConfigAndPool, MiddlewarePool, MiddlewarePoolConnection};
pub use query::QueryAndParams;
pub use results::{CustomDbRow, ExecResult, ResultSet};
pub use session::{Session, SessionExt};
pub use transaction::Tx;
pub use translation::{PlaceholderStyle, TranslationMode, translate_placeholders};
pub use types::{ConversionMode, DatabaseType, ParamConverter, RowValues, convert_sql_params};
pub use update_sequence::{SequenceOutcome, UpdateStep, run_update_sequence, run_update_steps};

#[cfg(feature = "postgres")]
pub use postgres::{Params as PostgresParams, PostgresOptions};
#[cfg(feature = "sqlite")]
pub use sqlite::{Params as SqliteParams, SqliteOptions, SqliteOptionsBuilder};
