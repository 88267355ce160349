//! Sliding-window log
//!
//! Stores individual timestamps instead of fixed buckets. A window of length
//! `w` evaluated at `now` holds exactly the timestamps `t` with
//! `now - w < t <= now`.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Ordered timestamps for one key
#[derive(Debug, Clone)]
pub struct SlidingWindowLog {
    timestamps: VecDeque<DateTime<Utc>>,
    /// Length of the window last applied, used by background sweeps
    window: Duration,
}

impl Default for SlidingWindowLog {
    fn default() -> Self {
        Self::new(Duration::zero())
    }
}

impl SlidingWindowLog {
    pub fn new(window: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window,
        }
    }

    /// Drop every timestamp that has left the window
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        self.window = window;
        let cutoff = now - window;
        while self.timestamps.front().is_some_and(|t| *t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Prune using the window last applied to this log
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.prune(now, window);
    }

    /// Append a timestamp. Timestamps are kept in order even if the clock
    /// steps backwards.
    pub fn record(&mut self, now: DateTime<Utc>) {
        let at = match self.timestamps.back() {
            Some(last) if *last > now => *last,
            _ => now,
        };
        self.timestamps.push_back(at);
    }

    /// Number of timestamps inside the window at `now`, without mutating
    pub fn count_at(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.timestamps.iter().filter(|t| **t > cutoff).count()
    }

    /// Earliest retained timestamp inside the window at `now`
    pub fn oldest_at(&self, now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
        let cutoff = now - window;
        self.timestamps.iter().find(|t| **t > cutoff).copied()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.timestamps.front().copied()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_is_half_open() {
        let start = Utc::now();
        let window = Duration::minutes(1);
        let mut log = SlidingWindowLog::new(window);

        log.record(start);
        log.record(start + Duration::seconds(30));

        log.prune(start + Duration::seconds(59), window);
        assert_eq!(log.len(), 2);

        // Exactly one window later the first entry has left
        log.prune(start + Duration::seconds(60), window);
        assert_eq!(log.len(), 1);
        assert_eq!(log.oldest(), Some(start + Duration::seconds(30)));

        log.prune(start + Duration::seconds(90), window);
        assert!(log.is_empty());
    }

    #[test]
    fn test_read_only_counts() {
        let start = Utc::now();
        let window = Duration::seconds(10);
        let mut log = SlidingWindowLog::new(window);
        log.record(start);
        log.record(start + Duration::seconds(5));

        let later = start + Duration::seconds(12);
        assert_eq!(log.count_at(later, window), 1);
        assert_eq!(log.oldest_at(later, window), Some(start + Duration::seconds(5)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_expire_uses_last_window() {
        let start = Utc::now();
        let mut log = SlidingWindowLog::default();
        log.prune(start, Duration::seconds(5));
        log.record(start);

        log.expire(start + Duration::seconds(6));
        assert!(log.is_empty());
        assert_eq!(log.window(), Duration::seconds(5));
    }

    #[test]
    fn test_record_keeps_order_on_clock_skew() {
        let start = Utc::now();
        let mut log = SlidingWindowLog::new(Duration::minutes(1));
        log.record(start);
        log.record(start - Duration::seconds(5));
        assert_eq!(log.oldest(), Some(start));
        assert_eq!(log.len(), 2);
    }
}
