// PostgreSQL backend: pool setup, parameter binding, row extraction, and a
// connection wrapper that tracks explicit transaction state.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::PostgresOptions;
pub use connection::PgConnection;
pub use params::Params;
pub use query::build_result_set;
