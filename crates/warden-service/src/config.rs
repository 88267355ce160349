//! Security configuration
//!
//! Every table the core consults is loaded here once. After the
//! [`crate::SecurityService`] is built the configuration is never mutated.

use crate::headers::SecurityHeadersConfig;
use crate::validation::{FieldKind, FieldValidation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use warden_core::{Error, Operation, Result};
use warden_files::{BatchLimits, FileTypeTable, SecureFilenameOptions, ValidationOptions};
use warden_guard::csrf::MIN_SECRET_LEN;
use warden_guard::{
    DEFAULT_EVENT_CAPACITY, RateLimitPolicy, RateLimitTable, SuspiciousActivityConfig,
};
use warden_sanitize::{FieldRule, HtmlPolicy, TextOptions, UrlOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Upload validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub validation: ValidationOptions,
    pub batch: BatchLimits,
    pub filenames: SecureFilenameOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events retained in memory
    pub capacity: usize,
    /// Per-listener channel buffer
    pub listener_buffer: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
            listener_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,
    /// HMAC secret; development generates one at startup when unset
    pub secret: Option<String>,
    pub ttl_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret: None,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Allowed clock skew for `exp`/`nbf`/`iat`
    pub leeway_secs: i64,
    pub require_exp: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            leeway_secs: 60,
            require_exp: true,
        }
    }
}

/// Endpoint classes with a standard middleware ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Auth,
    TicketCreate,
    FileUpload,
    Search,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Auth,
        EndpointClass::TicketCreate,
        EndpointClass::FileUpload,
        EndpointClass::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::TicketCreate => "ticket_create",
            EndpointClass::FileUpload => "file_upload",
            EndpointClass::Search => "search",
        }
    }

    /// Standard settings for the class
    pub fn default_config(&self) -> EndpointConfig {
        match self {
            EndpointClass::Auth => EndpointConfig {
                operation: Operation::Auth,
                authenticate: false,
                csrf: true,
                activity: "login_failure".to_string(),
                fields: BTreeMap::from([("email".to_string(), FieldRule::Email)]),
                validation: BTreeMap::from([
                    ("email".to_string(), FieldValidation::new(FieldKind::Email).required()),
                    (
                        "password".to_string(),
                        FieldValidation::new(FieldKind::String).required().length(1, 1024),
                    ),
                ]),
            },
            EndpointClass::TicketCreate => EndpointConfig {
                operation: Operation::Api,
                authenticate: true,
                csrf: true,
                activity: "ticket_rejected".to_string(),
                fields: BTreeMap::from([
                    ("title".to_string(), FieldRule::Text(TextOptions::single_line(200))),
                    ("description".to_string(), FieldRule::Html(HtmlPolicy::default())),
                    ("contact_email".to_string(), FieldRule::Email),
                    ("reference_url".to_string(), FieldRule::Url(UrlOptions::default())),
                ]),
                validation: BTreeMap::from([
                    (
                        "title".to_string(),
                        FieldValidation::new(FieldKind::String).required().length(3, 200),
                    ),
                    (
                        "description".to_string(),
                        FieldValidation::new(FieldKind::String).required().length(1, 50_000),
                    ),
                    (
                        "priority".to_string(),
                        FieldValidation::new(FieldKind::String)
                            .one_of(&["low", "medium", "high", "urgent"]),
                    ),
                    ("contact_email".to_string(), FieldValidation::new(FieldKind::Email)),
                ]),
            },
            EndpointClass::FileUpload => EndpointConfig {
                operation: Operation::Upload,
                authenticate: true,
                csrf: true,
                activity: "upload_rejected".to_string(),
                fields: BTreeMap::from([(
                    "ticket_id".to_string(),
                    FieldRule::Text(TextOptions::single_line(64)),
                )]),
                validation: BTreeMap::from([(
                    "ticket_id".to_string(),
                    FieldValidation::new(FieldKind::String)
                        .required()
                        .pattern(r"^[A-Za-z0-9_-]{1,64}$"),
                )]),
            },
            EndpointClass::Search => EndpointConfig {
                operation: Operation::Search,
                authenticate: true,
                csrf: false,
                activity: "search_abuse".to_string(),
                fields: BTreeMap::from([(
                    "q".to_string(),
                    FieldRule::Text(TextOptions::single_line(200)),
                )]),
                validation: BTreeMap::from([(
                    "q".to_string(),
                    FieldValidation::new(FieldKind::String).required().length(1, 200),
                )]),
            },
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Middleware settings for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Rate-limited operation
    pub operation: Operation,
    /// Require a structurally valid bearer token
    pub authenticate: bool,
    /// Require a CSRF token on state-changing methods
    pub csrf: bool,
    /// Activity recorded against the actor whenever a request is rejected
    pub activity: String,
    /// Sanitization rule per body field; other fields are sanitized as text
    pub fields: BTreeMap<String, FieldRule>,
    pub validation: BTreeMap<String, FieldValidation>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            operation: Operation::Api,
            authenticate: true,
            csrf: true,
            activity: "request_rejected".to_string(),
            fields: BTreeMap::new(),
            validation: BTreeMap::new(),
        }
    }
}

impl EndpointConfig {
    pub fn problems(&self, endpoint: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.activity.trim().is_empty() {
            problems.push(format!("endpoint '{}': activity must not be empty", endpoint));
        }
        for (field, rule) in &self.fields {
            if let Err(e) = rule.validate() {
                problems.push(format!("endpoint '{}' field '{}': {}", endpoint, field, e));
            }
        }
        for (field, rule) in &self.validation {
            for problem in rule.problems(field) {
                problems.push(format!("endpoint '{}': {}", endpoint, problem));
            }
        }
        problems
    }
}

/// Complete configuration of the security core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub environment: Environment,

    /// Default log filter when RUST_LOG is unset
    pub log_level: String,

    pub rate_limits: RateLimitTable,

    pub file_types: FileTypeTable,

    pub uploads: UploadConfig,

    pub suspicious: SuspiciousActivityConfig,

    pub events: EventConfig,

    /// Policy for the `html` sanitization context
    pub html: HtmlPolicy,

    pub headers: SecurityHeadersConfig,

    pub csrf: CsrfConfig,

    pub tokens: TokenConfig,

    /// Middleware settings keyed by endpoint name
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Interval of the background sweep over windowed tables
    pub cleanup_interval_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "info".to_string(),
            rate_limits: RateLimitTable::default(),
            file_types: FileTypeTable::default(),
            uploads: UploadConfig::default(),
            suspicious: SuspiciousActivityConfig::default(),
            events: EventConfig::default(),
            html: HtmlPolicy::default(),
            headers: SecurityHeadersConfig::default(),
            csrf: CsrfConfig::default(),
            tokens: TokenConfig::default(),
            endpoints: EndpointClass::ALL
                .iter()
                .map(|class| (class.as_str().to_string(), class.default_config()))
                .collect(),
            cleanup_interval_secs: 60,
        }
    }
}

impl SecurityConfig {
    pub fn for_development() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "debug".to_string(),
            headers: SecurityHeadersConfig::development(),
            ..Default::default()
        }
    }

    /// Strict uploads and a required CSRF secret
    pub fn for_production() -> Self {
        let mut config = Self {
            environment: Environment::Production,
            headers: SecurityHeadersConfig::production(),
            ..Default::default()
        };
        config.uploads.validation.strict_mode = true;
        config
    }

    pub fn with_rate_limit(mut self, operation: Operation, policy: RateLimitPolicy) -> Self {
        self.rate_limits = self.rate_limits.with_policy(operation, policy);
        self
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, endpoint: EndpointConfig) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    pub fn with_csrf_secret(mut self, secret: impl Into<String>) -> Self {
        self.csrf.secret = Some(secret.into());
        self
    }

    pub fn with_strict_uploads(mut self, strict: bool) -> Self {
        self.uploads.validation.strict_mode = strict;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Every semantic problem in the configuration
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if EnvFilter::try_new(&self.log_level).is_err() {
            problems.push(format!("invalid log_level '{}'", self.log_level));
        }
        if self.cleanup_interval_secs == 0 {
            problems.push("cleanup_interval_secs must be positive".to_string());
        }

        problems.extend(self.rate_limits.problems());
        problems.extend(self.file_types.problems());
        problems.extend(self.uploads.validation.problems());
        problems.extend(self.uploads.batch.problems());
        problems.extend(self.uploads.filenames.problems());
        if let Err(e) = self.suspicious.validate() {
            problems.push(e.to_string());
        }

        if self.events.capacity == 0 {
            problems.push("events.capacity must be positive".to_string());
        }
        if self.events.listener_buffer == 0 {
            problems.push("events.listener_buffer must be positive".to_string());
        }

        if let Err(e) = self.html.validate() {
            problems.push(format!("html policy: {}", e));
        }
        problems.extend(self.headers.problems());

        if self.csrf.enabled {
            match &self.csrf.secret {
                Some(secret) if secret.len() < MIN_SECRET_LEN => problems.push(format!(
                    "csrf.secret must be at least {} bytes",
                    MIN_SECRET_LEN
                )),
                None if self.is_production() => {
                    problems.push("csrf.secret is required in production".to_string())
                }
                _ => {}
            }
            if self.csrf.ttl_secs == 0 {
                problems.push("csrf.ttl_secs must be positive".to_string());
            }
        }
        if self.tokens.leeway_secs < 0 {
            problems.push("tokens.leeway_secs must not be negative".to_string());
        }

        for (name, endpoint) in &self.endpoints {
            if name.trim().is_empty() {
                problems.push("endpoint names must not be empty".to_string());
            }
            problems.extend(endpoint.problems(name));
        }

        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SecurityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoints.len(), 4);
        assert_eq!(config.events.capacity, 100);
        assert_eq!(
            config.rate_limits.policy_for(&Operation::Auth),
            RateLimitPolicy::per_minutes(5, 15)
        );
    }

    #[test]
    fn test_production_requires_csrf_secret() {
        let config = SecurityConfig::for_production();
        assert!(config.uploads.validation.strict_mode);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("csrf.secret is required"));

        let config = config.with_csrf_secret("0123456789abcdef0123");
        assert!(config.validate().is_ok());

        let short = SecurityConfig::default().with_csrf_secret("short");
        assert_eq!(short.problems().len(), 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SecurityConfig::from_json_str(
            r#"{
                "environment": "production",
                "csrf": { "secret": "an-adequately-long-secret" },
                "rate_limits": { "policies": { "auth": { "max_requests": 3, "window_ms": 60000 } } },
                "suspicious": { "threshold": 7 }
            }"#,
        )
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.rate_limits.policy_for(&Operation::Auth).max_requests, 3);
        assert_eq!(config.suspicious.threshold, 7);
        assert_eq!(config.suspicious.window_ms, 60 * 60 * 1000);
        assert_eq!(config.csrf.ttl_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_problems_are_collected() {
        let mut config = SecurityConfig::default().with_log_level("warden=loud");
        config.events.capacity = 0;
        config.uploads.batch.concurrency = 0;
        config.uploads.filenames.max_length = 20;
        let mut endpoint = EndpointConfig::default();
        endpoint
            .validation
            .insert("code".to_string(), FieldValidation::new(FieldKind::String).pattern("("));
        config = config.with_endpoint("broken", endpoint);

        let problems = config.problems();
        assert!(problems.iter().any(|p| p.contains("log_level")));
        assert!(problems.iter().any(|p| p.contains("events.capacity")));
        assert!(problems.iter().any(|p| p.contains("concurrency")));
        assert!(problems.iter().any(|p| p.contains("filenames.max_length 20")));
        assert!(problems.iter().any(|p| p.contains("endpoint 'broken'")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "log_level": "warn", "cleanup_interval_secs": 5 }}"#).unwrap();

        let config = SecurityConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.cleanup_interval_secs, 5);

        assert!(matches!(
            SecurityConfig::from_file("/nonexistent/warden.json"),
            Err(Error::Io(_))
        ));
        assert!(matches!(
            SecurityConfig::from_json_str("{ nope"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_classes() {
        let search = EndpointClass::Search.default_config();
        assert!(!search.csrf);
        assert_eq!(search.operation, Operation::Search);
        assert_eq!(EndpointClass::TicketCreate.to_string(), "ticket_create");
    }
}
