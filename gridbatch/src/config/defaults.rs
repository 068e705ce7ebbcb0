//! Default values for every configuration setting.

use super::settings::{
    ConfigFile, EnvironmentSettings, LoggingSettings, PoolSettings, UpdateSettings,
};
use crate::execution::{
    DEFAULT_DOWNLOAD_POOL_SIZE, DEFAULT_INCREMENT_UPDATE_INTERVAL, DEFAULT_KILL_POOL_SIZE,
    DEFAULT_MAX_CONCURRENT_SUBMISSIONS, DEFAULT_MAX_UPDATE_INTERVAL, DEFAULT_MIN_UPDATE_INTERVAL,
    DEFAULT_REMOVE_POOL_SIZE, DEFAULT_UPLOAD_POOL_SIZE,
};
use crate::logging::{default_log_dir, default_log_file};
use std::path::PathBuf;

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIRECTORY_NAME: &str = ".gridbatch";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_UPDATE_INTERVAL,
            max_interval: DEFAULT_MAX_UPDATE_INTERVAL,
            increment: DEFAULT_INCREMENT_UPDATE_INTERVAL,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_POOL_SIZE,
            download: DEFAULT_DOWNLOAD_POOL_SIZE,
            remove: DEFAULT_REMOVE_POOL_SIZE,
            kill: DEFAULT_KILL_POOL_SIZE,
        }
    }
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(default_log_dir()),
            file: default_log_file().to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            update: UpdateSettings::default(),
            pools: PoolSettings::default(),
            environment: EnvironmentSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
