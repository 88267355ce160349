//! Warden Core Library
//!
//! This crate provides the shared types, error handling and time source
//! used by every Warden component.
//!
//! # Overview
//!
//! Warden is the client-side security validation and abuse-control core of a
//! ticketing application: rate limiting, input sanitization, upload
//! validation and suspicious-activity detection. Everything here is a leaf
//! dependency of the other crates.
//!
//! # Modules
//!
//! - `error` - Error types and result aliases
//! - `types` - Operations, file categories and sanitization contexts
//! - `clock` - Injectable time source for windowed tables

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, RejectionCode, Result};
pub use types::{FileCategory, Operation, SanitizationContext};
