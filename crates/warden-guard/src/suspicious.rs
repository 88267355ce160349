//! Suspicious-activity monitor
//!
//! Counts occurrences of an activity per identifier in a trailing window and
//! flags the pair once the count reaches a threshold. Flagging only emits a
//! `suspicious_activity_detected` event; blocking is left to the caller.

use crate::events::{SecurityEventBus, SecurityEventType};
use crate::window::SlidingWindowLog;
use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::{Clock, Error, Result, SystemClock};

/// Thresholds for the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousActivityConfig {
    /// Occurrences inside the window that flag an identifier
    pub threshold: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Per-activity threshold overrides
    pub activity_thresholds: HashMap<String, u32>,
}

impl Default for SuspiciousActivityConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_ms: 60 * 60 * 1000,
            activity_thresholds: HashMap::new(),
        }
    }
}

impl SuspiciousActivityConfig {
    pub fn with_activity_threshold(mut self, activity: impl Into<String>, threshold: u32) -> Self {
        self.activity_thresholds.insert(activity.into(), threshold);
        self
    }

    pub fn threshold_for(&self, activity: &str) -> u32 {
        self.activity_thresholds
            .get(activity)
            .copied()
            .unwrap_or(self.threshold)
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 || self.activity_thresholds.values().any(|t| *t == 0) {
            return Err(Error::Configuration(
                "suspicious activity thresholds must be positive".into(),
            ));
        }
        if self.window_ms == 0 {
            return Err(Error::Configuration(
                "suspicious activity window_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ActivityKey {
    identifier: String,
    activity: String,
}

impl ActivityKey {
    fn new(identifier: &str, activity: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            activity: activity.to_string(),
        }
    }
}

/// Per (identifier, activity) occurrence tracker
pub struct SuspiciousActivityMonitor {
    config: SuspiciousActivityConfig,
    records: DashMap<ActivityKey, SlidingWindowLog>,
    events: Option<Arc<SecurityEventBus>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SuspiciousActivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspiciousActivityMonitor")
            .field("config", &self.config)
            .field("tracked", &self.records.len())
            .finish()
    }
}

impl Default for SuspiciousActivityMonitor {
    fn default() -> Self {
        Self::new(SuspiciousActivityConfig::default())
    }
}

impl SuspiciousActivityMonitor {
    pub fn new(config: SuspiciousActivityConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SuspiciousActivityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            records: DashMap::new(),
            events: None,
            clock,
        }
    }

    /// Publish flags on this bus
    pub fn with_events(mut self, events: Arc<SecurityEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SuspiciousActivityConfig {
        &self.config
    }

    /// Record one occurrence; returns true if the pair is now flagged
    pub fn check(&self, identifier: &str, activity: &str, metadata: serde_json::Value) -> bool {
        let threshold = self.config.threshold_for(activity);
        let window = self.config.window();
        let now = self.clock.now();

        let occurrences = {
            let mut log = self
                .records
                .entry(ActivityKey::new(identifier, activity))
                .or_insert_with(|| SlidingWindowLog::new(window));
            log.prune(now, window);
            log.record(now);
            log.len()
        };

        let flagged = occurrences >= threshold as usize;
        if !flagged {
            debug!(identifier, activity, occurrences, "Activity recorded");
            return false;
        }

        warn!(
            identifier,
            activity,
            occurrences,
            threshold,
            "Suspicious activity detected"
        );

        if let Some(ref events) = self.events {
            events.emit(
                SecurityEventType::SuspiciousActivityDetected,
                serde_json::json!({
                    "identifier": identifier,
                    "activity": activity,
                    "occurrences": occurrences,
                    "threshold": threshold,
                    "metadata": metadata,
                }),
            );
        }

        true
    }

    /// Occurrences currently inside the window, without recording one
    pub fn occurrences(&self, identifier: &str, activity: &str) -> usize {
        let now = self.clock.now();
        self.records
            .get(&ActivityKey::new(identifier, activity))
            .map(|log| log.count_at(now, self.config.window()))
            .unwrap_or(0)
    }

    pub fn is_flagged(&self, identifier: &str, activity: &str) -> bool {
        self.occurrences(identifier, activity) >= self.config.threshold_for(activity) as usize
    }

    /// Forget every activity recorded for an identifier
    pub fn reset(&self, identifier: &str) {
        self.records.retain(|key, _| key.identifier != identifier);
    }

    /// Prune every record and evict the empty ones; returns the number evicted
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, log| {
            log.expire(now);
            !log.is_empty()
        });
        before.saturating_sub(self.records.len())
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::ManualClock;

    fn monitor() -> (SuspiciousActivityMonitor, Arc<ManualClock>, Arc<SecurityEventBus>) {
        let clock = Arc::new(ManualClock::starting_now());
        let events = Arc::new(SecurityEventBus::default());
        let monitor = SuspiciousActivityMonitor::with_clock(
            SuspiciousActivityConfig::default(),
            clock.clone(),
        )
        .with_events(events.clone());
        (monitor, clock, events)
    }

    #[test]
    fn test_flags_on_fifth_occurrence() {
        let (monitor, clock, events) = monitor();

        for _ in 0..4 {
            assert!(!monitor.check("user-y", "login_attempt", json!({})));
            clock.advance(Duration::minutes(1));
        }
        assert!(events.is_empty());

        assert!(monitor.check("user-y", "login_attempt", json!({ "ip": "10.0.0.1" })));
        assert!(monitor.is_flagged("user-y", "login_attempt"));

        let flagged = events.recent(1);
        assert_eq!(flagged[0].event_type, SecurityEventType::SuspiciousActivityDetected);
        assert_eq!(flagged[0].data["identifier"], "user-y");
        assert_eq!(flagged[0].data["occurrences"], 5);
        assert_eq!(flagged[0].data["metadata"]["ip"], "10.0.0.1");
    }

    #[test]
    fn test_unflags_after_window() {
        let (monitor, clock, _events) = monitor();

        for _ in 0..5 {
            monitor.check("user-y", "login_attempt", json!({}));
        }
        assert!(monitor.is_flagged("user-y", "login_attempt"));

        clock.advance(Duration::hours(1));
        assert!(!monitor.is_flagged("user-y", "login_attempt"));
        assert_eq!(monitor.occurrences("user-y", "login_attempt"), 0);
        assert!(!monitor.check("user-y", "login_attempt", json!({})));
    }

    #[test]
    fn test_activities_and_identifiers_are_separate() {
        let (monitor, _clock, _events) = monitor();

        for _ in 0..4 {
            monitor.check("a", "login_attempt", json!({}));
            monitor.check("a", "file_rejected", json!({}));
            monitor.check("b", "login_attempt", json!({}));
        }
        assert!(!monitor.is_flagged("a", "login_attempt"));
        assert!(monitor.check("a", "login_attempt", json!({})));
        assert!(!monitor.is_flagged("a", "file_rejected"));
        assert!(!monitor.is_flagged("b", "login_attempt"));
    }

    #[test]
    fn test_activity_threshold_override() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = SuspiciousActivityConfig::default().with_activity_threshold("csrf_failure", 2);
        let monitor = SuspiciousActivityMonitor::with_clock(config, clock);

        assert!(!monitor.check("s", "csrf_failure", json!({})));
        assert!(monitor.check("s", "csrf_failure", json!({})));
    }

    #[test]
    fn test_reset_and_cleanup() {
        let (monitor, clock, _events) = monitor();
        monitor.check("a", "x", json!({}));
        monitor.check("a", "y", json!({}));
        monitor.check("b", "x", json!({}));

        monitor.reset("a");
        assert_eq!(monitor.tracked(), 1);

        clock.advance(Duration::hours(2));
        assert_eq!(monitor.cleanup(), 1);
        assert_eq!(monitor.tracked(), 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(SuspiciousActivityConfig::default().validate().is_ok());
        let bad = SuspiciousActivityConfig::default().with_activity_threshold("x", 0);
        assert!(bad.validate().is_err());
    }
}
