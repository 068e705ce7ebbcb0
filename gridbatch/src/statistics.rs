//! Duration samples collected by environments.
//!
//! Environments receive queue and run durations of their jobs through
//! [`BatchEnvironment::sample`](crate::execution::BatchEnvironment::sample).
//! [`Statistics`] keeps a bounded history per sample kind and answers simple
//! aggregate queries over it.

use crate::execution::SampleType;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Default number of samples kept per kind.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Bounded history of duration samples.
#[derive(Debug)]
pub struct Statistics {
    capacity: usize,
    history: Mutex<HashMap<SampleType, VecDeque<Duration>>>,
}

impl Statistics {
    /// Creates a history keeping at most `capacity` samples per kind.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Records a sample, evicting the oldest one when the history is full.
    pub fn record(&self, kind: SampleType, duration: Duration) {
        let mut history = self.history.lock();
        let samples = history.entry(kind).or_default();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    /// Returns the number of samples kept for a kind.
    pub fn count(&self, kind: SampleType) -> usize {
        self.history.lock().get(&kind).map_or(0, VecDeque::len)
    }

    /// Returns the mean of the samples of a kind.
    pub fn mean(&self, kind: SampleType) -> Option<Duration> {
        let history = self.history.lock();
        let samples = history.get(&kind).filter(|s| !s.is_empty())?;
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Returns the median of the samples of a kind.
    ///
    /// For an even number of samples, the lower middle sample.
    pub fn median(&self, kind: SampleType) -> Option<Duration> {
        let history = self.history.lock();
        let samples = history.get(&kind).filter(|s| !s.is_empty())?;
        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[(sorted.len() - 1) / 2])
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_empty() {
        let stats = Statistics::default();
        assert_eq!(stats.count(SampleType::Waiting), 0);
        assert_eq!(stats.mean(SampleType::Waiting), None);
        assert_eq!(stats.median(SampleType::Running), None);
    }

    #[test]
    fn test_aggregates_per_kind() {
        let stats = Statistics::default();
        for s in [5, 1, 3] {
            stats.record(SampleType::Waiting, secs(s));
        }
        stats.record(SampleType::Running, secs(100));

        assert_eq!(stats.count(SampleType::Waiting), 3);
        assert_eq!(stats.median(SampleType::Waiting), Some(secs(3)));
        assert_eq!(stats.mean(SampleType::Waiting), Some(secs(3)));
        assert_eq!(stats.median(SampleType::Running), Some(secs(100)));
    }

    #[test]
    fn test_history_is_bounded() {
        let stats = Statistics::new(2);
        for s in [1, 2, 3] {
            stats.record(SampleType::Running, secs(s));
        }
        assert_eq!(stats.count(SampleType::Running), 2);
        assert_eq!(stats.mean(SampleType::Running), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_even_median_takes_lower() {
        let stats = Statistics::default();
        for s in [4, 1, 2, 3] {
            stats.record(SampleType::Waiting, secs(s));
        }
        assert_eq!(stats.median(SampleType::Waiting), Some(secs(2)));
    }
}
