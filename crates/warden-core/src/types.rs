//! Shared domain types
//!
//! Operations keyed by the rate limiter, file categories used by the upload
//! validator and the contexts understood by the sanitizer.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A sensitive operation subject to rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    /// Login / token exchange
    Auth,
    /// General API calls
    Api,
    /// File uploads
    Upload,
    /// Search queries
    Search,
    /// Password reset requests
    PasswordReset,
    /// Any other named operation
    Custom(String),
}

impl Operation {
    /// Stable name of the operation
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Auth => "auth",
            Operation::Api => "api",
            Operation::Upload => "upload",
            Operation::Search => "search",
            Operation::PasswordReset => "password_reset",
            Operation::Custom(name) => name,
        }
    }
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" => Operation::Auth,
            "api" => Operation::Api,
            "upload" => Operation::Upload,
            "search" => Operation::Search,
            "password_reset" => Operation::PasswordReset,
            other => Operation::Custom(other.to_string()),
        }
    }
}

impl From<String> for Operation {
    fn from(s: String) -> Self {
        Operation::from(s.as_str())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad category an uploaded file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Image,
    Video,
    Document,
    Audio,
}

impl FileCategory {
    /// All categories in table order
    pub const ALL: [FileCategory; 4] = [
        FileCategory::Image,
        FileCategory::Video,
        FileCategory::Document,
        FileCategory::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Document => "document",
            FileCategory::Audio => "audio",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context an untrusted string is sanitized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationContext {
    Html,
    Text,
    Email,
    Url,
    Filename,
    Json,
    Sql,
}

impl SanitizationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanitizationContext::Html => "html",
            SanitizationContext::Text => "text",
            SanitizationContext::Email => "email",
            SanitizationContext::Url => "url",
            SanitizationContext::Filename => "filename",
            SanitizationContext::Json => "json",
            SanitizationContext::Sql => "sql",
        }
    }
}

impl FromStr for SanitizationContext {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(SanitizationContext::Html),
            "text" => Ok(SanitizationContext::Text),
            "email" => Ok(SanitizationContext::Email),
            "url" => Ok(SanitizationContext::Url),
            "filename" => Ok(SanitizationContext::Filename),
            "json" => Ok(SanitizationContext::Json),
            "sql" => Ok(SanitizationContext::Sql),
            other => Err(crate::Error::Configuration(format!(
                "unknown sanitization context: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SanitizationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
