//! Warden - client-side security validation and abuse control
//!
//! This is the main library crate that re-exports all Warden components.

pub use warden_core as core;
pub use warden_files as files;
pub use warden_guard as guard;
pub use warden_sanitize as sanitize;
pub use warden_service as service;

// Re-export commonly used types
pub use warden_core::{
    Clock, Error, FileCategory, ManualClock, Operation, RejectionCode, Result,
    SanitizationContext, SystemClock,
};

pub use warden_files::{FileSource, FileValidator, FileVerdict, UploadedFile, ValidationOptions};
pub use warden_guard::{
    RateLimitPolicy, RateLimitStatus, RateLimiter, SecurityEvent, SecurityEventBus,
    SecurityEventType, SuspiciousActivityMonitor,
};
pub use warden_sanitize::{FieldRule, FormSchema, HtmlPolicy, sanitize_input};
pub use warden_service::{
    EndpointClass, Method, MiddlewarePipeline, SecurityConfig, SecurityRequest, SecurityService,
};
