//! Warden Guard
//!
//! Abuse control for the security core: windowed tables shared across
//! requests, the event stream they report to, and the request credentials
//! checked before any of them run.
//!
//! # Modules
//!
//! - `window`: sliding-window log shared by the limiter and the monitor
//! - `rate_limit`: per (operation, identifier) admission control
//! - `suspicious`: per (identifier, activity) threshold flagging
//! - `events`: bounded security event log with listener fan-out
//! - `token`: structural bearer-token inspection
//! - `csrf`: session-bound CSRF tokens

pub mod csrf;
pub mod events;
pub mod rate_limit;
pub mod suspicious;
pub mod token;
pub mod window;

pub use csrf::{CsrfProtector, generate_secret};
pub use events::{
    DEFAULT_EVENT_CAPACITY, EventFilter, ListenerId, SecurityEvent, SecurityEventBus,
    SecurityEventType,
};
pub use rate_limit::{RateLimitKey, RateLimitPolicy, RateLimitStatus, RateLimitTable, RateLimiter};
pub use suspicious::{SuspiciousActivityConfig, SuspiciousActivityMonitor};
pub use token::{TokenClaims, TokenInspector};
pub use window::SlidingWindowLog;
