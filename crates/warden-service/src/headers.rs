//! Security response headers
//!
//! Returned as name/value pairs; attaching them to a response belongs to
//! the host HTTP layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    /// Content-Security-Policy directives, joined with `; `
    pub content_security_policy: Vec<String>,
    pub enable_hsts: bool,
    /// HSTS max-age in seconds (default: 1 year)
    pub hsts_max_age: u64,
    pub hsts_include_subdomains: bool,
    pub hsts_preload: bool,
    pub content_type_options: String,
    /// DENY, SAMEORIGIN, or empty to disable
    pub frame_options: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            content_security_policy: [
                "default-src 'self'",
                "script-src 'self'",
                "style-src 'self' 'unsafe-inline'",
                "img-src 'self' data: https:",
                "font-src 'self'",
                "connect-src 'self'",
                "object-src 'none'",
                "frame-ancestors 'none'",
                "base-uri 'self'",
                "form-action 'self'",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            enable_hsts: true,
            hsts_max_age: 31_536_000,
            hsts_include_subdomains: true,
            hsts_preload: false,
            content_type_options: "nosniff".to_string(),
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "geolocation=(), microphone=(), camera=(), payment=()".to_string(),
        }
    }
}

impl SecurityHeadersConfig {
    /// No HSTS for plain-HTTP local development
    pub fn development() -> Self {
        Self {
            enable_hsts: false,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            hsts_preload: true,
            ..Default::default()
        }
    }

    pub fn content_security_policy(&self) -> String {
        self.content_security_policy.join("; ")
    }

    /// Header name/value pairs; empty values are left out
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        if !self.content_security_policy.is_empty() {
            headers.push(("Content-Security-Policy", self.content_security_policy()));
        }
        if self.enable_hsts {
            let mut hsts = format!("max-age={}", self.hsts_max_age);
            if self.hsts_include_subdomains {
                hsts.push_str("; includeSubDomains");
            }
            if self.hsts_preload {
                hsts.push_str("; preload");
            }
            headers.push(("Strict-Transport-Security", hsts));
        }

        let fixed = [
            ("X-Content-Type-Options", &self.content_type_options),
            ("X-Frame-Options", &self.frame_options),
            ("Referrer-Policy", &self.referrer_policy),
            ("Permissions-Policy", &self.permissions_policy),
        ];
        for (name, value) in fixed {
            if !value.is_empty() {
                headers.push((name, value.clone()));
            }
        }

        headers
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for directive in &self.content_security_policy {
            if directive.trim().is_empty() || directive.contains([';', '\r', '\n']) {
                problems.push(format!("invalid CSP directive '{}'", directive));
            }
        }
        let values = [
            &self.content_type_options,
            &self.frame_options,
            &self.referrer_policy,
            &self.permissions_policy,
        ];
        if values.iter().any(|v| v.contains(['\r', '\n'])) {
            problems.push("header values must not contain line breaks".to_string());
        }
        if self.enable_hsts && self.hsts_max_age == 0 {
            problems.push("hsts_max_age must be positive when HSTS is enabled".to_string());
        }
        problems
    }
}
