//! Sliding-window rate limiting
//!
//! Requests are counted per (operation, identifier) with a sliding-window log.
//! Each key's window lives in a `DashMap` entry, and the entry guard is held
//! across prune, check and record so concurrent callers cannot both observe a
//! free slot.

use crate::window::SlidingWindowLog;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warden_core::{Clock, Error, Operation, Result, SystemClock};

/// Limit for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests allowed inside the window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub const fn per_minutes(max_requests: u32, minutes: u64) -> Self {
        Self::new(max_requests, minutes * 60_000)
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::Configuration("max_requests must be positive".into()));
        }
        if self.window_ms == 0 {
            return Err(Error::Configuration("window_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Per-operation limits plus a fallback for operations without an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTable {
    pub policies: HashMap<Operation, RateLimitPolicy>,
    pub fallback: RateLimitPolicy,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(Operation::Auth, RateLimitPolicy::per_minutes(5, 15));
        policies.insert(Operation::Api, RateLimitPolicy::per_minutes(100, 1));
        policies.insert(Operation::Upload, RateLimitPolicy::per_minutes(10, 5));
        policies.insert(Operation::Search, RateLimitPolicy::per_minutes(50, 1));
        policies.insert(Operation::PasswordReset, RateLimitPolicy::per_minutes(3, 60));

        Self {
            policies,
            fallback: RateLimitPolicy::per_minutes(60, 1),
        }
    }
}

impl RateLimitTable {
    pub fn with_policy(mut self, operation: Operation, policy: RateLimitPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    pub fn policy_for(&self, operation: &Operation) -> RateLimitPolicy {
        self.policies.get(operation).copied().unwrap_or(self.fallback)
    }

    /// Every invalid entry, reported together
    pub fn problems(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .policies
            .iter()
            .filter_map(|(op, policy)| policy.validate().err().map(|e| format!("rate limit '{}': {}", op, e)))
            .collect();
        if let Err(e) = self.fallback.validate() {
            problems.push(format!("fallback rate limit: {}", e));
        }
        problems.sort();
        problems
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    /// When the oldest request in the window expires and frees a slot
    pub reset_time: DateTime<Utc>,
    /// Requests counted inside the window, including this one if allowed
    pub total_requests: u32,
    pub max_requests: u32,
}

impl RateLimitStatus {
    /// Turn a denial into [`Error::RateLimitExceeded`]
    pub fn into_result(self, operation: &Operation) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(Error::RateLimitExceeded {
                operation: operation.clone(),
                reset_time: self.reset_time,
            })
        }
    }

    /// Seconds a client should wait before retrying
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        if self.allowed {
            0
        } else {
            (self.reset_time - now).num_seconds().max(0)
        }
    }
}

/// Key of a rate-limit window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub operation: Operation,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(operation: Operation, identifier: impl Into<String>) -> Self {
        Self {
            operation,
            identifier: identifier.into(),
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Sliding-window log rate limiter
pub struct RateLimiter {
    table: RateLimitTable,
    windows: DashMap<RateLimitKey, SlidingWindowLog>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("table", &self.table)
            .field("tracked_keys", &self.windows.len())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitTable::default())
    }
}

impl RateLimiter {
    pub fn new(table: RateLimitTable) -> Self {
        Self::with_clock(table, Arc::new(SystemClock))
    }

    pub fn with_clock(table: RateLimitTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    /// Check and, if allowed, record a request
    ///
    /// `override_policy` replaces the table's policy for this call only.
    pub fn check_limit(
        &self,
        operation: &Operation,
        identifier: &str,
        override_policy: Option<RateLimitPolicy>,
    ) -> RateLimitStatus {
        let policy = override_policy.unwrap_or_else(|| self.table.policy_for(operation));
        let window = policy.window();
        let now = self.clock.now();

        let mut log = self
            .windows
            .entry(RateLimitKey::new(operation.clone(), identifier))
            .or_insert_with(|| SlidingWindowLog::new(window));
        log.prune(now, window);

        let count = saturating_u32(log.len());
        if count < policy.max_requests {
            log.record(now);
            let oldest = log.oldest().unwrap_or(now);
            debug!(
                operation = %operation,
                identifier,
                count = count + 1,
                max = policy.max_requests,
                "Rate limit check passed"
            );
            return RateLimitStatus {
                allowed: true,
                remaining: policy.max_requests - count - 1,
                reset_time: oldest + window,
                total_requests: count + 1,
                max_requests: policy.max_requests,
            };
        }

        let reset_time = log.oldest().unwrap_or(now) + window;
        drop(log);

        warn!(
            operation = %operation,
            identifier,
            count,
            max = policy.max_requests,
            reset_time = %reset_time,
            "Rate limit exceeded"
        );

        RateLimitStatus {
            allowed: false,
            remaining: 0,
            reset_time,
            total_requests: count,
            max_requests: policy.max_requests,
        }
    }

    /// Current status without recording a request
    pub fn status(&self, operation: &Operation, identifier: &str) -> RateLimitStatus {
        let policy = self.table.policy_for(operation);
        let window = policy.window();
        let now = self.clock.now();

        let key = RateLimitKey::new(operation.clone(), identifier);
        let (count, oldest) = match self.windows.get(&key) {
            Some(log) => (
                saturating_u32(log.count_at(now, window)),
                log.oldest_at(now, window),
            ),
            None => (0, None),
        };

        RateLimitStatus {
            allowed: count < policy.max_requests,
            remaining: policy.max_requests.saturating_sub(count),
            reset_time: oldest.unwrap_or(now) + window,
            total_requests: count,
            max_requests: policy.max_requests,
        }
    }

    /// Clear one key's window
    pub fn reset(&self, operation: &Operation, identifier: &str) {
        self.windows
            .remove(&RateLimitKey::new(operation.clone(), identifier));
    }

    /// Clear every operation's window for an identifier
    pub fn reset_identifier(&self, identifier: &str) {
        self.windows.retain(|key, _| key.identifier != identifier);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Prune every window and evict the empty ones; returns the number evicted
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, log| {
            log.expire(now);
            !log.is_empty()
        });
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, "Evicted idle rate limit windows");
        }
        evicted
    }

    /// Run [`RateLimiter::cleanup`] on a fixed interval
    pub fn spawn_cleanup(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.cleanup();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ManualClock;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (
            RateLimiter::with_clock(RateLimitTable::default(), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_auth_window() {
        let (limiter, clock) = limiter();
        let op = Operation::Auth;

        for expected in [4, 3, 2, 1, 0] {
            let status = limiter.check_limit(&op, "user-x", None);
            assert!(status.allowed);
            assert_eq!(status.remaining, expected);
            assert_eq!(status.max_requests, 5);
        }

        let denied = limiter.check_limit(&op, "user-x", None);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.total_requests, 5);
        assert_eq!(denied.reset_time, clock.now() + Duration::minutes(15));

        clock.advance(Duration::minutes(15));
        let allowed = limiter.check_limit(&op, "user-x", None);
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 4);
    }

    #[test]
    fn test_sliding_not_fixed_bucket() {
        let (limiter, clock) = limiter();
        let policy = RateLimitPolicy::new(2, 10_000);
        let op = Operation::Custom("export".into());

        assert!(limiter.check_limit(&op, "u", Some(policy)).allowed);
        clock.advance(Duration::seconds(6));
        assert!(limiter.check_limit(&op, "u", Some(policy)).allowed);
        clock.advance(Duration::seconds(2));

        let denied = limiter.check_limit(&op, "u", Some(policy));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_time, clock.now() + Duration::seconds(2));

        // The first request leaves the window; the second still counts
        clock.advance(Duration::seconds(2));
        let status = limiter.check_limit(&op, "u", Some(policy));
        assert!(status.allowed);
        assert_eq!(status.remaining, 0);
        assert!(!limiter.check_limit(&op, "u", Some(policy)).allowed);
    }

    #[test]
    fn test_denial_records_nothing() {
        let (limiter, clock) = limiter();
        let policy = RateLimitPolicy::new(1, 1_000);
        let op = Operation::Api;

        assert!(limiter.check_limit(&op, "u", Some(policy)).allowed);
        for _ in 0..10 {
            assert!(!limiter.check_limit(&op, "u", Some(policy)).allowed);
        }
        clock.advance(Duration::seconds(1));
        assert!(limiter.check_limit(&op, "u", Some(policy)).allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter();
        let policy = RateLimitPolicy::new(1, 60_000);

        assert!(limiter.check_limit(&Operation::Search, "a", Some(policy)).allowed);
        assert!(limiter.check_limit(&Operation::Search, "b", Some(policy)).allowed);
        assert!(limiter.check_limit(&Operation::Upload, "a", Some(policy)).allowed);
        assert!(!limiter.check_limit(&Operation::Search, "a", Some(policy)).allowed);
    }

    #[test]
    fn test_reset_and_reset_identifier() {
        let (limiter, _clock) = limiter();
        let policy = RateLimitPolicy::new(1, 60_000);

        limiter.check_limit(&Operation::Auth, "a", Some(policy));
        limiter.check_limit(&Operation::Search, "a", Some(policy));
        limiter.check_limit(&Operation::Search, "b", Some(policy));

        limiter.reset(&Operation::Auth, "a");
        assert!(limiter.check_limit(&Operation::Auth, "a", Some(policy)).allowed);

        limiter.reset_identifier("a");
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.check_limit(&Operation::Search, "a", Some(policy)).allowed);
    }

    #[test]
    fn test_status_is_read_only() {
        let (limiter, _clock) = limiter();
        limiter.check_limit(&Operation::Auth, "u", None);

        let status = limiter.status(&Operation::Auth, "u");
        assert_eq!(status.total_requests, 1);
        assert_eq!(status.remaining, 4);
        assert_eq!(limiter.status(&Operation::Auth, "u").total_requests, 1);
    }

    #[test]
    fn test_cleanup_evicts_idle_windows() {
        let (limiter, clock) = limiter();
        limiter.check_limit(&Operation::Api, "a", None);
        limiter.check_limit(&Operation::Auth, "b", None);
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::minutes(2));
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        clock.advance(Duration::minutes(15));
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_into_result() {
        let (limiter, _clock) = limiter();
        let policy = RateLimitPolicy::new(1, 60_000);
        let op = Operation::Upload;

        assert!(limiter.check_limit(&op, "u", Some(policy)).into_result(&op).is_ok());
        let err = limiter
            .check_limit(&op, "u", Some(policy))
            .into_result(&op)
            .unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded { .. }));
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_table_lookup_and_validation() {
        let table = RateLimitTable::default();
        assert_eq!(table.policy_for(&Operation::Auth), RateLimitPolicy::per_minutes(5, 15));
        assert_eq!(table.policy_for(&Operation::Custom("x".into())), table.fallback);
        assert!(table.problems().is_empty());

        let bad = table
            .with_policy(Operation::Search, RateLimitPolicy::new(0, 1000))
            .with_policy(Operation::Api, RateLimitPolicy::new(5, 0));
        assert_eq!(bad.problems().len(), 2);
    }

    #[test]
    fn test_table_from_json() {
        let table: RateLimitTable = serde_json::from_str(
            r#"{"policies": {"auth": {"max_requests": 3, "window_ms": 1000}}}"#,
        )
        .unwrap();
        assert_eq!(table.policy_for(&Operation::Auth).max_requests, 3);
        assert_eq!(table.fallback, RateLimitPolicy::per_minutes(60, 1));
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::default());
        let policy = RateLimitPolicy::new(50, 60_000);
        let op = Operation::Api;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let op = op.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_limit(&op, "shared", Some(policy)).allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[tokio::test]
    async fn test_spawned_cleanup_runs() {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = Arc::new(RateLimiter::with_clock(RateLimitTable::default(), clock.clone()));
        limiter.check_limit(&Operation::Api, "a", None);
        clock.advance(Duration::minutes(5));

        let handle = limiter.clone().spawn_cleanup(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(limiter.tracked_keys(), 0);
    }
}
