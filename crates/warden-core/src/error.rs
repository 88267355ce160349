//! Error types for Warden
//!
//! Every denial produced by the security core is an expected, handleable
//! outcome. The variants carry enough structure for a UI layer to show
//! actionable feedback and an HTTP-like status code for API layers.

use crate::types::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reason code attached to a rejected (or flagged) file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionCode {
    /// Extension or MIME type is on the fixed dangerous denylist
    DangerousExtension,
    /// File matched none of the allowed types
    TypeNotAllowed,
    /// File is larger than its category allows
    SizeExceeded,
    /// Image is larger than the configured pixel dimensions
    DimensionExceeded,
    /// Image is implausibly small (tracking pixel)
    DimensionTooSmall,
    /// Leading bytes do not match the declared MIME type
    SignatureMismatch,
    /// Heuristic scan matched a suspicious pattern
    HeuristicFlag,
    /// File name is too long or contains NUL bytes / traversal sequences
    InvalidFilename,
    /// File content could not be read
    UnreadableContent,
    /// Reading the file content exceeded the read timeout
    ReadTimeout,
    /// A caller-supplied validator rejected the file
    CustomRule,
}

impl RejectionCode {
    /// Stable wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCode::DangerousExtension => "dangerous-extension",
            RejectionCode::TypeNotAllowed => "type-not-allowed",
            RejectionCode::SizeExceeded => "size-exceeded",
            RejectionCode::DimensionExceeded => "dimension-exceeded",
            RejectionCode::DimensionTooSmall => "dimension-too-small",
            RejectionCode::SignatureMismatch => "signature-mismatch",
            RejectionCode::HeuristicFlag => "heuristic-flag",
            RejectionCode::InvalidFilename => "invalid-filename",
            RejectionCode::UnreadableContent => "unreadable-content",
            RejectionCode::ReadTimeout => "read-timeout",
            RejectionCode::CustomRule => "custom-rule",
        }
    }
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for Warden operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Abuse Control ==========
    #[error("Rate limit exceeded for {operation}; retry after {reset_time}")]
    RateLimitExceeded {
        operation: Operation,
        reset_time: DateTime<Utc>,
    },

    #[error("Suspicious activity '{activity}' detected for {identifier} ({occurrences} occurrences)")]
    SuspiciousActivity {
        identifier: String,
        activity: String,
        occurrences: usize,
    },

    // ========== Validation ==========
    #[error("Validation failed for {field}: {}", reasons.join("; "))]
    ValidationFailed { field: String, reasons: Vec<String> },

    #[error("File rejected ({reason}): {detail}")]
    FileRejected {
        reason: RejectionCode,
        detail: String,
    },

    #[error("Sanitization error: {0}")]
    Sanitization(String),

    // ========== Authentication ==========
    #[error("CSRF token missing or invalid")]
    CsrfTokenInvalid,

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    // ========== IO ==========
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP-like status code for API layers
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RateLimitExceeded { .. } => 429,
            Error::SuspiciousActivity { .. } => 403,
            Error::ValidationFailed { .. } => 422,
            Error::FileRejected { reason, .. } => match reason {
                RejectionCode::SizeExceeded => 413,
                RejectionCode::ReadTimeout => 408,
                _ => 415,
            },
            Error::Sanitization(_) => 400,
            Error::CsrfTokenInvalid => 403,
            Error::AuthRequired(_) => 401,
            Error::Timeout(_) => 408,
            Error::Io(_) | Error::Configuration(_) | Error::Internal(_) => 500,
        }
    }

    /// Stable snake_case tag used in event payloads
    pub fn code(&self) -> &'static str {
        match self {
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::SuspiciousActivity { .. } => "suspicious_activity",
            Error::ValidationFailed { .. } => "validation_failed",
            Error::FileRejected { .. } => "file_rejected",
            Error::Sanitization(_) => "sanitization_error",
            Error::CsrfTokenInvalid => "csrf_token_invalid",
            Error::AuthRequired(_) => "auth_required",
            Error::Timeout(_) => "timeout",
            Error::Io(_) => "io_error",
            Error::Configuration(_) => "configuration_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Returns true if the error is caused by the caller's input or behaviour
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimitExceeded { .. } | Error::Timeout(_))
    }

    /// Structured detail for event payloads
    pub fn detail(&self) -> serde_json::Value {
        match self {
            Error::RateLimitExceeded {
                operation,
                reset_time,
            } => serde_json::json!({
                "operation": operation.to_string(),
                "reset_time": reset_time.to_rfc3339(),
            }),
            Error::SuspiciousActivity {
                identifier,
                activity,
                occurrences,
            } => serde_json::json!({
                "identifier": identifier,
                "activity": activity,
                "occurrences": occurrences,
            }),
            Error::ValidationFailed { field, reasons } => serde_json::json!({
                "field": field,
                "reasons": reasons,
            }),
            Error::FileRejected { reason, detail } => serde_json::json!({
                "reason": reason.as_str(),
                "detail": detail,
            }),
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }
}
