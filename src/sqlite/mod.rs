// SQLite backend
//
// - config: pool options and the bb8 connection manager
// - connection: pooled connection wrapper with explicit transaction state
// - params: RowValues -> rusqlite values
// - query: result set extraction

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use params::Params;
pub use query::build_result_set;
