//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::DatabaseConfig;
pub use crate::error::{FailureTag, SequenceError, SqlMiddlewareDbError};
pub use crate::executor::AsyncDatabaseExecutor;
pub use crate::named::{NamedParams, bind_named};
pub use crate::pool::{ConfigAndPool, MiddlewarePool, MiddlewarePoolConnection};
pub use crate::query::QueryAndParams;
pub use crate::results::{CustomDbRow, ExecResult, ResultSet};
pub use crate::session::{Session, SessionExt};
pub use crate::transaction::Tx;
pub use crate::translation::{PlaceholderStyle, TranslationMode, translate_placeholders};
pub use crate::types::{ConversionMode, DatabaseType, RowValues, convert_sql_params};
pub use crate::update_sequence::{
    SequenceOutcome, UpdateStep, run_update_sequence, run_update_steps,
};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresOptions;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder};
