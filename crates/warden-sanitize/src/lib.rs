//! Warden Sanitize
//!
//! Context-aware cleaning of untrusted input before it reaches storage or
//! rendering. Sanitizers are pure functions: they never fail on recoverable
//! bad input, they return a safe empty or default value instead.
//!
//! # Modules
//!
//! - `html`: allow-list HTML sanitizer built on a tokenizing parser
//! - `text`: text, email, URL, filename and SQL sanitizers
//! - `json`: JSON parsing with shallow schema checks
//! - `form`: per-field rules and whole-record sanitization

pub mod entities;
pub mod form;
pub mod html;
pub mod json;
pub mod lexer;
pub mod text;

pub use form::{FieldRule, FormSchema, FormSchemaBuilder, sanitize_form_data};
pub use html::{HtmlPolicy, sanitize_html, strip_dangerous_schemes};
pub use json::{JsonSchema, JsonType, parse_json, sanitize_json};
pub use text::{
    TextOptions, UrlOptions, sanitize_email, sanitize_filename, sanitize_sql, sanitize_text,
    sanitize_url,
};

use warden_core::SanitizationContext;

/// Sanitize a string for a context using that context's default options.
///
/// JSON input comes back re-serialized, or as `null` when it is malformed.
pub fn sanitize_input(input: &str, context: SanitizationContext) -> String {
    match FieldRule::for_context(context).apply_str(input) {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
