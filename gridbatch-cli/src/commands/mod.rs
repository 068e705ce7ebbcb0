//! CLI command implementations.
//!
//! - [`config`] - Configuration management (list, path, init)
//! - [`run`] - Run a batch of jobs on the loopback environment

pub mod config;
pub mod run;
