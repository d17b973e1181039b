use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default rolling window size
pub const DEFAULT_MAX_SAMPLES: usize = 50;

/// Summary of the rolling latency window. Empty windows report -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub min_ms: i64,
    pub avg_ms: i64,
    pub max_ms: i64,
    pub count: usize,
}

/// Bounded FIFO window of latency samples in milliseconds.
#[derive(Debug, Clone)]
pub struct StatsCalculator {
    samples: VecDeque<i64>,
    max: usize,
}

impl Default for StatsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl StatsCalculator {
    pub fn new(max_samples: usize) -> Self {
        let max = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max),
            max,
        }
    }

    /// Set the window bound (zero is clamped to one) and drop the oldest
    /// samples that no longer fit.
    pub fn set_max_samples(&mut self, n: usize) {
        self.max = n.max(1);
        self.trim();
    }

    pub fn max_samples(&self) -> usize {
        self.max
    }

    /// Negative samples are ignored.
    pub fn add_sample(&mut self, ms: i64) {
        if ms < 0 {
            return;
        }
        self.samples.push_back(ms);
        self.trim();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn min(&self) -> i64 {
        self.samples.iter().copied().min().unwrap_or(-1)
    }

    pub fn max(&self) -> i64 {
        self.samples.iter().copied().max().unwrap_or(-1)
    }

    /// Floor of the mean.
    pub fn avg(&self) -> i64 {
        if self.samples.is_empty() {
            return -1;
        }
        let sum: i64 = self.samples.iter().sum();
        sum / self.samples.len() as i64
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = i64> + '_ {
        self.samples.iter().copied()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            min_ms: self.min(),
            avg_ms: self.avg(),
            max_ms: self.max(),
            count: self.count(),
        }
    }

    fn trim(&mut self) {
        while self.samples.len() > self.max {
            self.samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reports_sentinels() {
        let stats = StatsCalculator::default();
        assert_eq!(stats.min(), -1);
        assert_eq!(stats.max(), -1);
        assert_eq!(stats.avg(), -1);
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.max_samples(), DEFAULT_MAX_SAMPLES);
    }

    #[test]
    fn test_min_avg_max() {
        let mut stats = StatsCalculator::default();
        for ms in [10, 20, 31] {
            stats.add_sample(ms);
        }
        assert_eq!(stats.min(), 10);
        assert_eq!(stats.max(), 31);
        // 61 / 3 floors to 20
        assert_eq!(stats.avg(), 20);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot { min_ms: 10, avg_ms: 20, max_ms: 31, count: 3 }
        );
    }

    #[test]
    fn test_negative_samples_ignored() {
        let mut stats = StatsCalculator::default();
        stats.add_sample(-1);
        stats.add_sample(-500);
        assert!(stats.is_empty());
        stats.add_sample(0);
        assert_eq!(stats.count(), 1);
        assert_eq!(stats.min(), 0);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let mut stats = StatsCalculator::new(3);
        for ms in 1..=10 {
            stats.add_sample(ms);
            assert!(stats.count() <= 3);
            let expected: Vec<i64> = ((ms - 2).max(1)..=ms).collect();
            assert_eq!(stats.samples().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn test_shrinking_bound_trims_oldest() {
        let mut stats = StatsCalculator::new(10);
        for ms in [5, 6, 7, 8] {
            stats.add_sample(ms);
        }
        stats.set_max_samples(2);
        assert_eq!(stats.samples().collect::<Vec<_>>(), vec![7, 8]);

        // Growing again keeps what is left
        stats.set_max_samples(4);
        stats.add_sample(9);
        assert_eq!(stats.samples().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn test_zero_bound_clamped() {
        let mut stats = StatsCalculator::new(0);
        assert_eq!(stats.max_samples(), 1);
        stats.add_sample(1);
        stats.add_sample(2);
        stats.set_max_samples(0);
        assert_eq!(stats.samples().collect::<Vec<_>>(), vec![2]);
    }
}
