//! Human-readable duration parsing (e.g., "PT2M", "90s").

use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;

/// Error parsing a duration string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid duration '{input}' - expected format like 'PT2M', 'PT1H30M', '90s' or '500ms'")]
pub struct DurationParseError {
    input: String,
}

impl DurationParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Parse a duration string.
///
/// Supports:
/// - ISO-8601 durations with days and time parts (`PT2M`, `PT1H30M`, `P1DT6H`, `PT0.5S`)
/// - Short forms: `ms`, `s`, `m`/`min`, `h` suffixes (`500ms`, `90s`, `2m`, `1h`)
/// - Bare numbers (treated as seconds)
/// - Case-insensitive, whitespace tolerant
///
/// # Examples
///
/// ```
/// use gridbatch::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("PT2M").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration("PT1H30M").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::new(s));
    }

    let upper = trimmed.to_ascii_uppercase();
    let parsed = match upper.strip_prefix('P') {
        Some(rest) => parse_iso(rest),
        None => parse_short(&trimmed.to_ascii_lowercase()),
    };
    parsed.ok_or_else(|| DurationParseError::new(s))
}

fn parse_iso(rest: &str) -> Option<Duration> {
    let (date, time) = match rest.split_once('T') {
        Some((_, "")) => return None,
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };
    if date.is_empty() && time.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    if !date.is_empty() {
        let days: u64 = date.strip_suffix('D')?.parse().ok()?;
        total += Duration::from_secs(days.checked_mul(86_400)?);
    }

    let mut number = String::new();
    for c in time.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'M' | 'S' => {
                let value: f64 = number.parse().ok()?;
                let unit = match c {
                    'H' => 3600.0,
                    'M' => 60.0,
                    _ => 1.0,
                };
                total += scaled(value, unit)?;
                number.clear();
            }
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(total)
}

fn parse_short(s: &str) -> Option<Duration> {
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" | "min" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    scaled(seconds, 1.0)
}

/// Converts `value` units of `unit_secs` seconds, rounded to the nanosecond.
fn scaled(value: f64, unit_secs: f64) -> Option<Duration> {
    let nanos = (value * unit_secs * 1e9).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

/// Format a duration as an ISO-8601 time duration.
///
/// # Examples
///
/// ```
/// use gridbatch::config::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(120)), "PT2M");
/// assert_eq!(format_duration(Duration::from_secs(5400)), "PT1H30M");
/// assert_eq!(format_duration(Duration::from_millis(500)), "PT0.5S");
/// ```
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let millis = d.subsec_millis();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = String::from("PT");
    if hours > 0 {
        let _ = write!(out, "{}H", hours);
    }
    if minutes > 0 {
        let _ = write!(out, "{}M", minutes);
    }
    if millis > 0 {
        let fraction = format!("{:03}", millis);
        let _ = write!(out, "{}.{}S", seconds, fraction.trim_end_matches('0'));
    } else if seconds > 0 || (hours == 0 && minutes == 0) {
        let _ = write!(out, "{}S", seconds);
    }
    out
}
