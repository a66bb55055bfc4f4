pub mod config;
pub mod error;

pub use config::{Settings, ValidationResult};
pub use error::{
    AppError, ConfigError, ForecastError, NetworkError, ReqwestErrorExt, StorageError,
};

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging: console output plus an append-only log file.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init(settings: &Settings) -> Result<()> {
    let log_path = &settings.log_file_path;
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!("skylog core initialized, logging to {}", log_path.display());
    Ok(())
}
