use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::storage::{StorageError, LOG_FILE};

/// Send `tracing` output to `<dir>/taskmatrix.log`. The terminal belongs to
/// the board view, so nothing is written to stderr.
///
/// `RUST_LOG` wins over `default_level`. Returns the log path.
pub fn init(dir: &Path, default_level: &str) -> Result<PathBuf, StorageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, repeated calls) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();

    Ok(path)
}
