use std::fs::OpenOptions;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::HeaderError;
use crate::store::ensure_dir;

/// Installs the global subscriber: human-readable output on stderr plus a
/// plain-text `dd_headers.<timestamp>.log` in the configured log directory.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig, run_id: &str) -> Result<Utf8PathBuf, HeaderError> {
    ensure_dir(&config.log_dir)?;
    let log_file = config.log_dir.join(format!("dd_headers.{run_id}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file.as_std_path())
        .map_err(|err| HeaderError::Filesystem(format!("open {log_file}: {err}")))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|err| {
            HeaderError::InvalidConfig(format!("logging.log_level {:?}: {err}", config.log_level))
        })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| HeaderError::InvalidConfig(format!("logging already initialised: {err}")))?;

    Ok(log_file)
}
