//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::time::Duration;

use super::duration::parse_duration;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [update] section
    if let Some(section) = ini.section(Some("update")) {
        if let Some(v) = interval(section, "update", "min_interval")? {
            config.update.min_interval = v;
        }
        if let Some(v) = interval(section, "update", "max_interval")? {
            config.update.max_interval = v;
        }
        if let Some(v) = interval(section, "update", "increment")? {
            config.update.increment = v;
        }
    }
    if config.update.max_interval < config.update.min_interval {
        return Err(ConfigFileError::InvalidValue {
            section: "update".to_string(),
            key: "max_interval".to_string(),
            value: super::duration::format_duration(config.update.max_interval),
            reason: format!(
                "must not be shorter than min_interval ({})",
                super::duration::format_duration(config.update.min_interval)
            ),
        });
    }

    // [pools] section
    if let Some(section) = ini.section(Some("pools")) {
        if let Some(v) = positive(section, "pools", "upload")? {
            config.pools.upload = v;
        }
        if let Some(v) = positive(section, "pools", "download")? {
            config.pools.download = v;
        }
        if let Some(v) = positive(section, "pools", "remove")? {
            config.pools.remove = v;
        }
        if let Some(v) = positive(section, "pools", "kill")? {
            config.pools.kill = v;
        }
    }

    // [environment] section
    if let Some(section) = ini.section(Some("environment")) {
        if let Some(v) = positive(section, "environment", "max_concurrent_submissions")? {
            config.environment.max_concurrent_submissions = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Reads a strictly positive duration.
fn interval(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigFileError::InvalidValue {
        section: section_name.to_string(),
        key: key.to_string(),
        value: v.to_string(),
        reason,
    };

    let duration = parse_duration(v).map_err(|e| invalid(e.to_string()))?;
    if duration.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(Some(duration))
}

/// Reads a strictly positive integer.
fn positive(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<usize>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    match v.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be a positive integer".to_string(),
        }),
    }
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlays_values() {
        let config = parse(
            "[update]\nmin_interval = 30s\nmax_interval = PT10M\nincrement = PT1M\n\
             [pools]\nupload = 4\nkill = 1\n\
             [environment]\nmax_concurrent_submissions = 50\n\
             [logging]\ndirectory = /var/log/gridbatch\nfile = run.log\n",
        )
        .unwrap();

        assert_eq!(config.update.min_interval, Duration::from_secs(30));
        assert_eq!(config.update.max_interval, Duration::from_secs(600));
        assert_eq!(config.update.increment, Duration::from_secs(60));
        assert_eq!(config.pools.upload, 4);
        assert_eq!(config.pools.download, ConfigFile::default().pools.download);
        assert_eq!(config.pools.kill, 1);
        assert_eq!(config.environment.max_concurrent_submissions, 50);
        assert_eq!(config.logging.directory, PathBuf::from("/var/log/gridbatch"));
        assert_eq!(config.logging.file, "run.log");
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = parse("[update]\nincrement = 0s\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "increment"
        ));
    }

    #[test]
    fn test_rejects_malformed_interval() {
        let err = parse("[update]\nmin_interval = soon\n").unwrap_err();
        assert!(err.to_string().contains("update.min_interval"));
    }

    #[test]
    fn test_rejects_max_below_min() {
        let err = parse("[update]\nmin_interval = PT10M\nmax_interval = PT5M\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "max_interval"
        ));
    }

    #[test]
    fn test_rejects_zero_pool() {
        let err = parse("[pools]\nremove = 0\n").unwrap_err();
        assert!(err.to_string().contains("pools.remove"));
    }

    #[test]
    fn test_blank_logging_keeps_defaults() {
        let config = parse("[logging]\ndirectory =\nfile =\n").unwrap();
        assert_eq!(config.logging, ConfigFile::default().logging);
    }
}
