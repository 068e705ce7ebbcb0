//! Configuration of the execution engine.
//!
//! Settings are read from an INI file (`~/.gridbatch/config.ini` by default)
//! and overlaid on built-in defaults. Missing files and missing keys fall back
//! to the defaults; malformed values are rejected with the offending
//! section and key.
//!
//! # Example
//!
//! ```
//! use gridbatch::config::ConfigFile;
//! use gridbatch::execution::{TaskPoolConfig, UpdateIntervalConfig};
//!
//! let config = ConfigFile::default();
//! let intervals = UpdateIntervalConfig::from(&config.update);
//! let pools = TaskPoolConfig::from(&config.pools);
//!
//! assert!(intervals.min <= intervals.max);
//! assert_eq!(pools.kill, 4);
//! ```

mod defaults;
mod duration;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{CONFIG_DIRECTORY_NAME, CONFIG_FILE_NAME};
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, EnvironmentSettings, LoggingSettings, PoolSettings, UpdateSettings};
