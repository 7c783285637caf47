use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install a global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.log_level` when set. Returns
/// `Ok(false)` if a subscriber was already installed, so calling this more
/// than once is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(config.log_to_console && !config.log_to_file);

    let installed = if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::InvalidConfiguration(
                "log_file_path must be specified when log_to_file is true".to_string(),
            )
        })?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let builder = builder.with_writer(Mutex::new(file));
        if config.json_format {
            builder.json().try_init().is_ok()
        } else {
            builder.try_init().is_ok()
        }
    } else {
        let builder = builder.with_writer(std::io::stderr);
        if config.json_format {
            builder.json().try_init().is_ok()
        } else {
            builder.try_init().is_ok()
        }
    };

    if installed {
        tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    Ok(installed)
}
