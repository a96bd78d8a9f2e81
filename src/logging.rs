//! Tracing setup for the `bulkfetch` binary.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "bulkfetch.log";

/// Install the global subscriber. Output goes through a non-blocking writer,
/// so worker threads never wait on stderr or the log file.
///
/// Non-verbose: `warn` to stderr, overridable with `RUST_LOG`.
/// Verbose: `debug` appended to `<log_dir>/bulkfetch.log`.
///
/// Keep the returned guard alive until exit, or buffered lines are lost.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let (writer, guard, filter) = match (verbose, log_dir) {
        (true, Some(dir)) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (w, g) = tracing_appender::non_blocking(appender);
            (w, g, EnvFilter::new("debug"))
        }
        (verbose, _) => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            let default_level = if verbose { "debug" } else { "warn" };
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level));
            (w, g, filter)
        }
    };
    let ansi = !verbose && crate::util::ansi_enabled();
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_names(verbose)
        .try_init()
    {
        eprintln!("Warning: failed to set up logging: {}", e);
    }
    Ok(guard)
}

/// Default log directory: `~/.bulkfetch/logs`.
pub fn default_log_dir() -> Option<std::path::PathBuf> {
    crate::config::Config::default_dir().map(|d| d.join("logs"))
}
