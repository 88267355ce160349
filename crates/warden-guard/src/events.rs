//! Security event bus
//!
//! Keeps the last `capacity` events in memory for dashboards and fans every
//! new event out to listeners over bounded channels. Delivery uses
//! `try_send`, so a slow listener loses events (counted in
//! [`SecurityEventBus::dropped_deliveries`]) instead of stalling the caller.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::{Clock, SystemClock};

/// Default number of events retained
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Default per-listener channel buffer
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

/// Security event categories
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecurityEventType {
    RateLimitExceeded,
    SuspiciousActivityDetected,
    InputSanitized,
    SanitizationFailed,
    FileRejected,
    FileFlagged,
    ValidationFailed,
    CsrfTokenInvalid,
    AuthFailed,
    MiddlewareRejected,
    Custom(String),
}

impl SecurityEventType {
    pub fn as_str(&self) -> &str {
        match self {
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::SuspiciousActivityDetected => "suspicious_activity_detected",
            SecurityEventType::InputSanitized => "input_sanitized",
            SecurityEventType::SanitizationFailed => "sanitization_failed",
            SecurityEventType::FileRejected => "file_rejected",
            SecurityEventType::FileFlagged => "file_flagged",
            SecurityEventType::ValidationFailed => "validation_failed",
            SecurityEventType::CsrfTokenInvalid => "csrf_token_invalid",
            SecurityEventType::AuthFailed => "auth_failed",
            SecurityEventType::MiddlewareRejected => "middleware_rejected",
            SecurityEventType::Custom(tag) => tag,
        }
    }
}

impl From<&str> for SecurityEventType {
    fn from(tag: &str) -> Self {
        match tag {
            "rate_limit_exceeded" => SecurityEventType::RateLimitExceeded,
            "suspicious_activity_detected" => SecurityEventType::SuspiciousActivityDetected,
            "input_sanitized" => SecurityEventType::InputSanitized,
            "sanitization_failed" => SecurityEventType::SanitizationFailed,
            "file_rejected" => SecurityEventType::FileRejected,
            "file_flagged" => SecurityEventType::FileFlagged,
            "validation_failed" => SecurityEventType::ValidationFailed,
            "csrf_token_invalid" => SecurityEventType::CsrfTokenInvalid,
            "auth_failed" => SecurityEventType::AuthFailed,
            "middleware_rejected" => SecurityEventType::MiddlewareRejected,
            other => SecurityEventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for SecurityEventType {
    fn from(tag: String) -> Self {
        SecurityEventType::from(tag.as_str())
    }
}

impl From<SecurityEventType> for String {
    fn from(event_type: SecurityEventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded security event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Filter for querying retained events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<SecurityEventType>,
    pub identifier: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Match events whose payload carries this `identifier`
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(ref event_type) = self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }

        if let Some(ref identifier) = self.identifier {
            if event.data.get("identifier").and_then(|v| v.as_str()) != Some(identifier.as_str()) {
                return false;
            }
        }

        if let Some(start) = self.start_time {
            if event.timestamp < start {
                return false;
            }
        }

        if let Some(end) = self.end_time {
            if event.timestamp > end {
                return false;
            }
        }

        true
    }
}

/// Handle returned by [`SecurityEventBus::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    sender: mpsc::Sender<SecurityEvent>,
}

/// Bounded in-memory event log with listener fan-out
pub struct SecurityEventBus {
    events: RwLock<VecDeque<SecurityEvent>>,
    capacity: usize,
    listeners: RwLock<Vec<Listener>>,
    listener_buffer: usize,
    next_listener_id: AtomicU64,
    dropped: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for SecurityEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for SecurityEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityEventBus")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl SecurityEventBus {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            listeners: RwLock::new(Vec::new()),
            listener_buffer: DEFAULT_LISTENER_BUFFER,
            next_listener_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            clock,
        }
    }

    /// Channel buffer used for listeners added after this call
    pub fn with_listener_buffer(mut self, buffer: usize) -> Self {
        self.listener_buffer = buffer.max(1);
        self
    }

    /// Record an event and deliver it to every listener
    pub fn emit(&self, event_type: SecurityEventType, data: serde_json::Value) -> SecurityEvent {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type,
            timestamp: self.clock.now(),
            data,
        };

        debug!(event_type = %event.event_type, event_id = %event.id, "Security event");

        {
            let mut events = self.events.write();
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        self.deliver(&event);
        event
    }

    fn deliver(&self, event: &SecurityEvent) {
        let mut closed = Vec::new();

        for listener in self.listeners.read().iter() {
            match listener.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(listener = listener.id.0, "Security event listener is full, event dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(listener.id),
            }
        }

        if !closed.is_empty() {
            self.listeners.write().retain(|l| !closed.contains(&l.id));
            debug!(count = closed.len(), "Removed closed security event listeners");
        }
    }

    /// Subscribe to new events
    pub fn add_listener(&self) -> (ListenerId, mpsc::Receiver<SecurityEvent>) {
        let (sender, receiver) = mpsc::channel(self.listener_buffer);
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Listener { id, sender });
        (id, receiver)
    }

    /// Unsubscribe; returns false if the listener was already gone
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        self.events.read().iter().rev().take(limit).cloned().collect()
    }

    /// Matching events, newest first
    pub fn query(&self, filter: &EventFilter, limit: usize) -> Vec<SecurityEvent> {
        self.events
            .read()
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliveries skipped because a listener's buffer was full
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::ManualClock;

    #[test]
    fn test_bounded_log() {
        let bus = SecurityEventBus::new(3);
        for i in 0..5 {
            bus.emit(SecurityEventType::Custom("tick".into()), json!({ "n": i }));
        }

        assert_eq!(bus.len(), 3);
        let recent = bus.recent(10);
        assert_eq!(recent[0].data["n"], 4);
        assert_eq!(recent[2].data["n"], 2);
    }

    #[test]
    fn test_listener_receives_events() {
        let bus = SecurityEventBus::default();
        let (id, mut rx) = bus.add_listener();

        bus.emit(SecurityEventType::RateLimitExceeded, json!({ "identifier": "u1" }));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, SecurityEventType::RateLimitExceeded);

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.emit(SecurityEventType::AuthFailed, json!({}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_listener_does_not_block() {
        let bus = SecurityEventBus::new(10).with_listener_buffer(1);
        let (_id, mut rx) = bus.add_listener();

        bus.emit(SecurityEventType::InputSanitized, json!({}));
        bus.emit(SecurityEventType::InputSanitized, json!({}));
        bus.emit(SecurityEventType::InputSanitized, json!({}));

        assert_eq!(bus.dropped_deliveries(), 2);
        assert!(rx.try_recv().is_ok());
        assert_eq!(bus.len(), 3);
    }

    #[test]
    fn test_closed_listeners_removed() {
        let bus = SecurityEventBus::default();
        let (_id, rx) = bus.add_listener();
        assert_eq!(bus.listener_count(), 1);

        drop(rx);
        bus.emit(SecurityEventType::FileRejected, json!({}));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_query_filter() {
        let clock = Arc::new(ManualClock::starting_now());
        let bus = SecurityEventBus::with_clock(100, clock.clone());
        let start = clock.now();

        bus.emit(SecurityEventType::RateLimitExceeded, json!({ "identifier": "a" }));
        clock.advance(chrono::Duration::minutes(5));
        bus.emit(SecurityEventType::RateLimitExceeded, json!({ "identifier": "b" }));
        bus.emit(SecurityEventType::FileRejected, json!({ "identifier": "a" }));

        let by_type = EventFilter::new().event_type(SecurityEventType::RateLimitExceeded);
        assert_eq!(bus.query(&by_type, 10).len(), 2);

        let by_identifier = EventFilter::new().identifier("a");
        assert_eq!(bus.query(&by_identifier, 10).len(), 2);

        let early = EventFilter::new().time_range(start, start + chrono::Duration::minutes(1));
        assert_eq!(bus.query(&early, 10).len(), 1);

        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_event_type_wire_format() {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: SecurityEventType::SuspiciousActivityDetected,
            timestamp: Utc::now(),
            data: json!({}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "suspicious_activity_detected");

        let custom: SecurityEventType = serde_json::from_str("\"export_started\"").unwrap();
        assert_eq!(custom, SecurityEventType::Custom("export_started".into()));
    }

    #[tokio::test]
    async fn test_async_listener() {
        let bus = Arc::new(SecurityEventBus::default());
        let (_id, mut rx) = bus.add_listener();

        let emitter = bus.clone();
        tokio::spawn(async move {
            emitter.emit(SecurityEventType::CsrfTokenInvalid, json!({ "identifier": "s" }));
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type.to_string(), "csrf_token_invalid");
    }
}
