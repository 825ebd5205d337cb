//! Subscriber setup for applications embedding the crate.
//!
//! The library itself only emits `tracing` events (targets under `tx_sequence`);
//! call [`init_tracing`] once from a binary or test harness to see them.
//! `RUST_LOG` always wins over the configured default level.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::error::SqlMiddlewareDbError;

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Default to `debug` instead of `info` when `RUST_LOG` is unset
    pub debug: bool,
    /// Also append every log line to this file
    pub log_file: Option<PathBuf>,
}

/// Install a global compact fmt subscriber.
///
/// # Errors
/// Returns `SqlMiddlewareDbError::ConfigError` if the log file cannot be created or
/// a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), SqlMiddlewareDbError> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = log_writer(config.log_file.as_deref()).map_err(|e| {
        SqlMiddlewareDbError::ConfigError(format!("cannot create log file: {e}"))
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .with_writer(writer)
        .compact()
        .try_init()
        .map_err(|e| SqlMiddlewareDbError::ConfigError(format!("tracing init failed: {e}")))
}

/// Stdout, teed into `path` when one is given.
fn log_writer(path: Option<&Path>) -> io::Result<BoxMakeWriter> {
    Ok(match path {
        Some(path) => {
            let file = Mutex::new(File::create(path)?);
            BoxMakeWriter::new(io::stdout.and(file))
        }
        None => BoxMakeWriter::new(io::stdout),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_subscriber::fmt::writer::MakeWriter;

    #[test]
    fn log_writer_tees_into_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequence.log");
        let writer = log_writer(Some(path.as_path())).unwrap();

        let mut out = writer.make_writer();
        out.write_all(b"update sequence committed\n").unwrap();
        out.flush().unwrap();
        drop(out);

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "update sequence committed\n");
    }

    #[test]
    fn missing_log_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("sequence.log");
        assert!(log_writer(Some(path.as_path())).is_err());
        assert!(log_writer(None).is_ok());
    }

    #[test]
    fn second_init_reports_an_error() {
        let config = TracingConfig::default();
        // the first call may lose to another test that already installed one
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
