//! CLI runner for common setup.
//!
//! Loads the configuration and initializes logging for commands that run
//! executions.

use crate::error::CliError;
use gridbatch::config::ConfigFile;
use gridbatch::logging::{init_logging, LoggingGuard};
use std::path::Path;
use tracing::info;

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load the configuration and initialize logging.
    ///
    /// Uses `config_path` when given, the default config file otherwise.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("gridbatch v{}", gridbatch::VERSION);
        info!("gridbatch CLI: {} command", command);
    }
}
