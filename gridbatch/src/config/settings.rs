//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Polling delay of executions
    pub update: UpdateSettings,
    /// Task pool sizes
    pub pools: PoolSettings,
    /// Environment limits
    pub environment: EnvironmentSettings,
    /// Logging destination
    pub logging: LoggingSettings,
}

/// Adaptive polling delay (`[update]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettings {
    /// Delay after a state change
    pub min_interval: Duration,
    /// Upper bound of the delay
    pub max_interval: Duration,
    /// Growth of the delay per unchanged cycle
    pub increment: Duration,
}

/// Concurrency of each task pool (`[pools]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub upload: usize,
    pub download: usize,
    pub remove: usize,
    pub kill: usize,
}

/// Environment limits (`[environment]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSettings {
    /// Access tokens per job service
    pub max_concurrent_submissions: usize,
}

/// Logging destination (`[logging]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log directory
    pub directory: PathBuf,
    /// Log file name inside the directory
    pub file: String,
}
