//! Adaptive polling delay.
//!
//! Executions whose state keeps changing are polled at the minimum interval.
//! While the state stays the same, each cycle lengthens the delay by a fixed
//! increment, up to a maximum.

use crate::config::UpdateSettings;
use std::time::Duration;

/// Default minimum delay between two updates of an execution.
pub const DEFAULT_MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Default maximum delay between two updates of an execution.
pub const DEFAULT_MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default delay increment applied while the state is unchanged.
pub const DEFAULT_INCREMENT_UPDATE_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Bounds of the adaptive polling delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateIntervalConfig {
    pub min: Duration,
    pub max: Duration,
    pub increment: Duration,
}

impl Default for UpdateIntervalConfig {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_UPDATE_INTERVAL,
            max: DEFAULT_MAX_UPDATE_INTERVAL,
            increment: DEFAULT_INCREMENT_UPDATE_INTERVAL,
        }
    }
}

impl From<&UpdateSettings> for UpdateIntervalConfig {
    fn from(settings: &UpdateSettings) -> Self {
        Self {
            min: settings.min_interval,
            max: settings.max_interval,
            increment: settings.increment,
        }
    }
}

/// Current polling delay of one execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdaptiveDelay {
    current: Option<Duration>,
}

impl AdaptiveDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to the delay of the next cycle.
    ///
    /// A state change, or an unset delay, resets to the minimum. Otherwise the
    /// increment is added unless the result would exceed the maximum, in which
    /// case the delay is left as is.
    pub fn advance(&mut self, state_changed: bool, config: &UpdateIntervalConfig) -> Duration {
        let next = match self.current {
            Some(current) if !state_changed => {
                let increased = current.saturating_add(config.increment);
                if increased <= config.max {
                    increased
                } else {
                    current
                }
            }
            _ => config.min,
        };
        self.current = Some(next);
        next
    }

    /// Unsets the delay; the next cycle starts again from the minimum.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Returns the current delay, or the minimum when unset.
    pub fn get(&self, config: &UpdateIntervalConfig) -> Duration {
        self.current.unwrap_or(config.min)
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn config(min: u64, max: u64, increment: u64) -> UpdateIntervalConfig {
        UpdateIntervalConfig {
            min: minutes(min),
            max: minutes(max),
            increment: minutes(increment),
        }
    }

    #[test]
    fn test_defaults() {
        let config = UpdateIntervalConfig::default();
        assert_eq!(config.min, minutes(2));
        assert_eq!(config.max, minutes(30));
        assert_eq!(config.increment, minutes(2));
    }

    #[test]
    fn test_unset_delay_reports_min() {
        let delay = AdaptiveDelay::new();
        assert!(!delay.is_set());
        assert_eq!(delay.get(&config(2, 10, 2)), minutes(2));
    }

    #[test]
    fn test_grows_until_max() {
        let config = config(2, 10, 2);
        let mut delay = AdaptiveDelay::new();

        let observed: Vec<Duration> = (0..6).map(|_| delay.advance(false, &config)).collect();
        let expected: Vec<Duration> = [2, 4, 6, 8, 10, 10].into_iter().map(minutes).collect();
        assert_eq!(observed, expected);
    }

    #[test]
    fn test_increment_overshooting_max_keeps_delay() {
        let config = config(2, 9, 3);
        let mut delay = AdaptiveDelay::new();

        assert_eq!(delay.advance(false, &config), minutes(2));
        assert_eq!(delay.advance(false, &config), minutes(5));
        assert_eq!(delay.advance(false, &config), minutes(8));
        // 11 > 9, the delay stays at 8
        assert_eq!(delay.advance(false, &config), minutes(8));
    }

    #[test]
    fn test_state_change_resets() {
        let config = config(2, 10, 2);
        let mut delay = AdaptiveDelay::new();
        delay.advance(false, &config);
        delay.advance(false, &config);
        assert_eq!(delay.get(&config), minutes(4));

        assert_eq!(delay.advance(true, &config), minutes(2));
    }

    #[test]
    fn test_reset_unsets() {
        let config = config(2, 10, 2);
        let mut delay = AdaptiveDelay::new();
        delay.advance(false, &config);
        delay.advance(false, &config);

        delay.reset();
        assert!(!delay.is_set());
        assert_eq!(delay.advance(false, &config), minutes(2));
    }
}
