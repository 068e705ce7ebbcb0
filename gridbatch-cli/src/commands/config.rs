//! Configuration management CLI commands.
//!
//! Provides `config list`, `config path` and `config init`.

use std::path::PathBuf;

use clap::Subcommand;
use gridbatch::config::{config_file_path, format_duration, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// List all configuration settings
    List {
        /// Configuration file (default: ~/.gridbatch/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,

    /// Write a configuration file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        /// Target file (default: ~/.gridbatch/config.ini)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::List { config } => run_list(config),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init { force, path } => run_init(force, path),
    }
}

/// List all configuration settings.
fn run_list(path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;

    println!("Configuration Settings");
    println!("======================");
    for line in settings_lines(&config) {
        println!("{}", line);
    }
    Ok(())
}

fn settings_lines(config: &ConfigFile) -> Vec<String> {
    vec![
        String::new(),
        "[update]".to_string(),
        format!("  min_interval = {}", format_duration(config.update.min_interval)),
        format!("  max_interval = {}", format_duration(config.update.max_interval)),
        format!("  increment = {}", format_duration(config.update.increment)),
        String::new(),
        "[pools]".to_string(),
        format!("  upload = {}", config.pools.upload),
        format!("  download = {}", config.pools.download),
        format!("  remove = {}", config.pools.remove),
        format!("  kill = {}", config.pools.kill),
        String::new(),
        "[environment]".to_string(),
        format!(
            "  max_concurrent_submissions = {}",
            config.environment.max_concurrent_submissions
        ),
        String::new(),
        "[logging]".to_string(),
        format!("  directory = {}", config.logging.directory.display()),
        format!("  file = {}", config.logging.file),
    ]
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Write the default configuration.
fn run_init(force: bool, path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);

    let created = if force {
        ConfigFile::default().save_to(&path)?;
        true
    } else {
        ConfigFile::ensure_exists_at(&path)?
    };

    if created {
        println!("Wrote default configuration to {}", path.display());
    } else {
        println!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_lines_cover_every_section() {
        let lines = settings_lines(&ConfigFile::default());
        for section in ["[update]", "[pools]", "[environment]", "[logging]"] {
            assert!(lines.iter().any(|l| l == section), "missing {}", section);
        }
        assert!(lines.iter().any(|l| l == "  min_interval = PT2M"));
    }

    #[test]
    fn test_init_respects_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[pools]\nkill = 1\n").unwrap();

        run_init(false, Some(path.clone())).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap().pools.kill, 1);

        run_init(true, Some(path.clone())).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
    }
}
