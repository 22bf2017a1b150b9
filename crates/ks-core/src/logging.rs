//! Tracing setup
//!
//! Human readable output goes to stderr. When `KEYSTONE_LOG_FILE` is set the
//! same events are also appended, without colors, to that file.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable naming an additional log file
pub const LOG_FILE_ENV: &str = "KEYSTONE_LOG_FILE";

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber
///
/// Calling this more than once is harmless; only the first call installs
/// anything.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut file_error = None;
    let file_layer = std::env::var_os(LOG_FILE_ENV)
        .map(PathBuf::from)
        .and_then(|path| match open_log_file(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                file_error = Some((path, e));
                None
            }
        })
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some((path, e)) = file_error {
        tracing::warn!("Cannot open log file {}: {}", path.display(), e);
    }
    if !installed {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn open_log_file(path: &std::path::Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
