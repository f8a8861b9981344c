//! Log output setup
//!
//! Human-readable lines with local timestamps on stdout, optionally
//! mirrored without ANSI colors to an append-only file. Filtering follows
//! `RUST_LOG`, defaulting to `info`.

use crate::error::WardenError;
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open `path` for appending, creating it if needed
///
/// # Errors
/// [`WardenError::Logging`] if the file cannot be opened
pub fn open_log_file(path: &Path) -> Result<File, WardenError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| WardenError::Logging(format!("cannot open {}: {e}", path.display())))
}

/// Install the global subscriber
///
/// # Errors
/// Log file unopenable, or a subscriber is already installed
pub fn init_logging(log_file: Option<&Path>) -> Result<(), WardenError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));

    let file = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_writer(Mutex::new(file))
        });

    Registry::default()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| WardenError::Logging(e.to_string()))
}
