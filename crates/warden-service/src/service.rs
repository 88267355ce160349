//! Security service facade
//!
//! One [`SecurityService`] is built at process start from a validated
//! [`SecurityConfig`] and shared (usually behind an `Arc`) by every caller.
//! It owns the windowed tables, the event bus and one middleware pipeline
//! per configured endpoint.

use crate::config::{EndpointConfig, SecurityConfig};
use crate::pipeline::{
    Authenticate, CsrfCheck, MiddlewarePipeline, RateLimit, Sanitize, SchemaValidate,
    SuspiciousActivityCheck,
};
use crate::request::SecurityRequest;
use crate::validation::ValidationSchema;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_core::{Clock, Error, Operation, Result, SanitizationContext, SystemClock};
use warden_files::{BatchSummary, FileSource, FileValidator, FileVerdict, SignatureTable};
use warden_guard::{
    CsrfProtector, EventFilter, ListenerId, RateLimitPolicy, RateLimitStatus, RateLimiter,
    SecurityEvent, SecurityEventBus, SecurityEventType, SuspiciousActivityMonitor,
    TokenInspector, generate_secret,
};
use warden_sanitize::{FormSchema, sanitize_form_data, sanitize_html};

pub struct SecurityService {
    config: SecurityConfig,
    events: Arc<SecurityEventBus>,
    rate_limiter: Arc<RateLimiter>,
    monitor: Arc<SuspiciousActivityMonitor>,
    files: FileValidator,
    csrf: Option<Arc<CsrfProtector>>,
    pipelines: BTreeMap<String, MiddlewarePipeline>,
}

impl std::fmt::Debug for SecurityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityService")
            .field("environment", &self.config.environment)
            .field("pipelines", &self.pipelines.keys().collect::<Vec<_>>())
            .field("csrf", &self.csrf.is_some())
            .finish_non_exhaustive()
    }
}

/// Shared components a pipeline is assembled from
struct Parts<'a> {
    events: &'a Arc<SecurityEventBus>,
    rate_limiter: &'a Arc<RateLimiter>,
    monitor: &'a Arc<SuspiciousActivityMonitor>,
    csrf: Option<&'a Arc<CsrfProtector>>,
    inspector: &'a TokenInspector,
}

impl Parts<'_> {
    /// authenticate, rate limit, CSRF, sanitize, validate, suspicious activity
    fn pipeline(&self, name: &str, endpoint: &EndpointConfig) -> Result<MiddlewarePipeline> {
        let form = FormSchema::from_rules(endpoint.fields.clone())
            .map_err(|e| Error::Configuration(format!("endpoint '{}': {}", name, e)))?;
        let schema = ValidationSchema::compile(&endpoint.validation)
            .map_err(|e| Error::Configuration(format!("endpoint '{}': {}", name, e)))?;

        let mut pipeline = MiddlewarePipeline::new(name, self.events.clone());
        if endpoint.authenticate {
            pipeline = pipeline.step(Authenticate::new(self.inspector.clone()));
        }
        pipeline = pipeline.step(RateLimit::new(
            self.rate_limiter.clone(),
            endpoint.operation.clone(),
        ));
        if let (true, Some(csrf)) = (endpoint.csrf, self.csrf) {
            pipeline = pipeline.step(CsrfCheck::new(csrf.clone()));
        }
        pipeline = pipeline.step(Sanitize::new(Arc::new(form)));
        if !schema.is_empty() {
            pipeline = pipeline.step(SchemaValidate::new(Arc::new(schema)));
        }
        Ok(pipeline
            .step(SuspiciousActivityCheck::new(
                self.monitor.clone(),
                endpoint.activity.clone(),
            ))
            .track_failures(self.monitor.clone(), endpoint.activity.clone()))
    }
}

impl SecurityService {
    pub fn new(config: SecurityConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build every component on one clock; fails on any configuration problem
    pub fn with_clock(config: SecurityConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(
            SecurityEventBus::with_clock(config.events.capacity, clock.clone())
                .with_listener_buffer(config.events.listener_buffer),
        );
        let rate_limiter = Arc::new(RateLimiter::with_clock(
            config.rate_limits.clone(),
            clock.clone(),
        ));
        let monitor = Arc::new(
            SuspiciousActivityMonitor::with_clock(config.suspicious.clone(), clock.clone())
                .with_events(events.clone()),
        );
        let files = FileValidator::new(config.file_types.clone(), SignatureTable::default());

        let csrf = if config.csrf.enabled {
            let secret = match &config.csrf.secret {
                Some(secret) => secret.clone(),
                None => {
                    warn!("No CSRF secret configured, using a per-process secret");
                    generate_secret()
                }
            };
            let ttl = i64::try_from(config.csrf.ttl_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .ok_or_else(|| Error::Configuration("csrf.ttl_secs is out of range".into()))?;
            Some(Arc::new(CsrfProtector::with_clock(secret, ttl, clock.clone())?))
        } else {
            None
        };

        let inspector = TokenInspector::new(clock)
            .with_leeway(config.tokens.leeway_secs)
            .require_exp(config.tokens.require_exp);

        let parts = Parts {
            events: &events,
            rate_limiter: &rate_limiter,
            monitor: &monitor,
            csrf: csrf.as_ref(),
            inspector: &inspector,
        };
        let pipelines = config
            .endpoints
            .iter()
            .map(|(name, endpoint)| -> Result<(String, MiddlewarePipeline)> {
                Ok((name.clone(), parts.pipeline(name, endpoint)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        info!(
            environment = ?config.environment,
            endpoints = pipelines.len(),
            csrf = csrf.is_some(),
            "Security service initialized"
        );

        Ok(Self {
            config,
            events,
            rate_limiter,
            monitor,
            files,
            csrf,
            pipelines,
        })
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<SecurityEventBus> {
        &self.events
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn monitor(&self) -> &Arc<SuspiciousActivityMonitor> {
        &self.monitor
    }

    pub fn file_validator(&self) -> &FileValidator {
        &self.files
    }

    // ========== Rate limiting ==========

    /// Check and record one request; denials are published as events
    pub fn check_rate_limit(
        &self,
        operation: &Operation,
        identifier: &str,
        override_policy: Option<RateLimitPolicy>,
    ) -> RateLimitStatus {
        let status = self
            .rate_limiter
            .check_limit(operation, identifier, override_policy);
        if !status.allowed {
            self.events.emit(
                SecurityEventType::RateLimitExceeded,
                json!({
                    "operation": operation.as_str(),
                    "identifier": identifier,
                    "reset_time": status.reset_time,
                    "max_requests": status.max_requests,
                }),
            );
        }
        status
    }

    // ========== Sanitization ==========

    /// Sanitize one value; `html` uses the configured policy
    pub fn sanitize_input(&self, input: &str, context: SanitizationContext) -> String {
        let output = match context {
            SanitizationContext::Html => sanitize_html(input, &self.config.html),
            other => warden_sanitize::sanitize_input(input, other),
        };

        if context == SanitizationContext::Json && output == "null" && input.trim() != "null" {
            self.events.emit(
                SecurityEventType::SanitizationFailed,
                json!({ "context": context.as_str(), "input_length": input.len() }),
            );
        } else if output != input {
            debug!(context = context.as_str(), "Input modified by sanitizer");
            self.events.emit(
                SecurityEventType::InputSanitized,
                json!({
                    "context": context.as_str(),
                    "input_length": input.len(),
                    "output_length": output.len(),
                }),
            );
        }
        output
    }

    /// Sanitize a record field by field; changed fields are published
    pub fn sanitize_form_data(
        &self,
        record: &Map<String, Value>,
        schema: &FormSchema,
    ) -> Map<String, Value> {
        let cleaned = sanitize_form_data(record, schema);
        let mut changed: Vec<&str> = record
            .iter()
            .filter(|(key, value)| cleaned.get(key.as_str()) != Some(value))
            .map(|(key, _)| key.as_str())
            .collect();
        changed.sort_unstable();

        if !changed.is_empty() {
            self.events.emit(
                SecurityEventType::InputSanitized,
                json!({ "context": "form", "fields": changed }),
            );
        }
        cleaned
    }

    // ========== Uploads ==========

    /// Validate one file with the configured options
    pub async fn validate_file(&self, file: &dyn FileSource) -> FileVerdict {
        let verdict = self
            .files
            .validate(file, &self.config.uploads.validation)
            .await;
        self.publish_verdict(&verdict);
        verdict
    }

    /// Validate a batch under the configured limits and concurrency cap
    pub async fn validate_files(&self, files: &[&dyn FileSource]) -> BatchSummary {
        let summary = self
            .files
            .validate_files(
                files,
                &self.config.uploads.validation,
                &self.config.uploads.batch,
            )
            .await;

        if !summary.batch_errors.is_empty() {
            self.events.emit(
                SecurityEventType::FileRejected,
                json!({ "batch": files.len(), "errors": summary.batch_errors }),
            );
        }
        for verdict in &summary.verdicts {
            self.publish_verdict(verdict);
        }
        summary
    }

    fn publish_verdict(&self, verdict: &FileVerdict) {
        if !verdict.is_valid {
            self.events.emit(
                SecurityEventType::FileRejected,
                json!({
                    "file_name": verdict.file_name,
                    "size": verdict.size,
                    "errors": verdict.errors,
                }),
            );
        } else if !verdict.warnings.is_empty() {
            self.events.emit(
                SecurityEventType::FileFlagged,
                json!({
                    "file_name": verdict.file_name,
                    "size": verdict.size,
                    "warnings": verdict.warnings,
                }),
            );
        }
    }

    /// Storage name for an upload
    pub fn generate_secure_filename(&self, original: &str) -> String {
        warden_files::generate_secure_filename(original, &self.config.uploads.filenames)
    }

    // ========== Suspicious activity ==========

    /// Record one occurrence; true once the actor is flagged
    pub fn check_suspicious_activity(&self, identifier: &str, activity: &str, metadata: Value) -> bool {
        self.monitor.check(identifier, activity, metadata)
    }

    // ========== Middleware ==========

    pub fn pipeline(&self, endpoint: &str) -> Option<&MiddlewarePipeline> {
        self.pipelines.get(endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Run an endpoint's pipeline over a request
    pub fn run_middleware_pipeline(
        &self,
        endpoint: &str,
        request: SecurityRequest,
    ) -> Result<SecurityRequest> {
        let pipeline = self.pipelines.get(endpoint).ok_or_else(|| {
            Error::Configuration(format!("no middleware pipeline for endpoint '{}'", endpoint))
        })?;
        pipeline.run(request)
    }

    // ========== CSRF ==========

    pub fn issue_csrf_token(&self, session_id: &str) -> Result<String> {
        self.csrf_protector()?.issue(session_id)
    }

    pub fn verify_csrf_token(&self, session_id: &str, token: &str) -> Result<()> {
        let result = self.csrf_protector()?.verify(session_id, token);
        if result.is_err() {
            self.events.emit(
                SecurityEventType::CsrfTokenInvalid,
                json!({ "session_id": session_id }),
            );
        }
        result
    }

    fn csrf_protector(&self) -> Result<&CsrfProtector> {
        self.csrf
            .as_deref()
            .ok_or_else(|| Error::Configuration("CSRF protection is disabled".into()))
    }

    // ========== Headers and events ==========

    pub fn security_headers(&self) -> Vec<(&'static str, String)> {
        self.config.headers.headers()
    }

    pub fn add_listener(&self) -> (ListenerId, mpsc::Receiver<SecurityEvent>) {
        self.events.add_listener()
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Newest first
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.events.recent(limit)
    }

    pub fn query_events(&self, filter: &EventFilter, limit: usize) -> Vec<SecurityEvent> {
        self.events.query(filter, limit)
    }

    /// Periodically evict empty windows from the rate-limit and activity tables
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let interval = std::time::Duration::from_secs(service.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let limits = service.rate_limiter.cleanup();
                let activities = service.monitor.cleanup();
                if limits + activities > 0 {
                    debug!(limits, activities, "Evicted expired windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CSRF_HEADER, Method};
    use base64::Engine;
    use warden_core::{ManualClock, RejectionCode};
    use warden_files::{DiskFile, UploadedFile};

    fn service() -> (SecurityService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = SecurityConfig::default().with_csrf_secret("test-secret-0123456789");
        (SecurityService::with_clock(config, clock.clone()).unwrap(), clock)
    }

    fn production_service() -> SecurityService {
        let config = SecurityConfig::for_production().with_csrf_secret("integration-secret-0123");
        SecurityService::with_clock(config, Arc::new(ManualClock::starting_now())).unwrap()
    }

    fn bearer(sub: &str, exp: i64) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "Bearer {}.{}.sig",
            engine.encode(r#"{"alg":"RS256"}"#),
            engine.encode(json!({"sub": sub, "exp": exp}).to_string())
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SecurityConfig::for_production();
        config.events.capacity = 0;
        let err = SecurityService::new(config).unwrap_err().to_string();
        assert!(err.contains("csrf.secret"));
        assert!(err.contains("events.capacity"));
    }

    #[test]
    fn test_auth_rate_limit_sequence() {
        let (service, clock) = service();
        let remaining: Vec<u32> = (0..5)
            .map(|_| service.check_rate_limit(&Operation::Auth, "x", None).remaining)
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = service.check_rate_limit(&Operation::Auth, "x", None);
        assert!(!denied.allowed);
        assert_eq!(
            service.recent_events(1)[0].event_type,
            SecurityEventType::RateLimitExceeded
        );

        clock.advance(chrono::Duration::minutes(15) + chrono::Duration::milliseconds(1));
        assert!(service.check_rate_limit(&Operation::Auth, "x", None).allowed);
    }

    #[test]
    fn test_sanitize_input_publishes_changes() {
        let (service, _) = service();
        assert_eq!(service.sanitize_input("plain", SanitizationContext::Text), "plain");
        assert!(service.events().is_empty());

        let html = service.sanitize_input(
            "<p>Hello <script>alert(1)</script><b>world</b></p>",
            SanitizationContext::Html,
        );
        assert_eq!(html, "<p>Hello <b>world</b></p>");
        assert_eq!(service.recent_events(1)[0].event_type, SecurityEventType::InputSanitized);

        assert_eq!(service.sanitize_input("{oops", SanitizationContext::Json), "null");
        assert_eq!(
            service.recent_events(1)[0].event_type,
            SecurityEventType::SanitizationFailed
        );
    }

    #[test]
    fn test_sanitize_form_data_reports_changed_fields() {
        let (service, _) = service();
        let schema = FormSchema::builder()
            .field("email", warden_sanitize::FieldRule::Email)
            .build()
            .unwrap();
        let record = json!({"email": " A@B.CO ", "note": "ok"});
        let cleaned = service.sanitize_form_data(record.as_object().unwrap(), &schema);
        assert_eq!(cleaned["email"], "a@b.co");
        assert_eq!(service.recent_events(1)[0].data["fields"], json!(["email"]));
    }

    #[tokio::test]
    async fn test_file_events() {
        let (service, _) = service();
        let exe = UploadedFile::new("resume.exe", "application/pdf", b"MZ\x90\x00".to_vec());
        let verdict = service.validate_file(&exe).await;
        assert_eq!(verdict.error_codes(), vec![RejectionCode::DangerousExtension]);

        let events = service.recent_events(1);
        let event = &events[0];
        assert_eq!(event.event_type, SecurityEventType::FileRejected);
        assert_eq!(event.data["file_name"], "resume.exe");
        assert_eq!(event.data["errors"][0]["code"], "dangerous-extension");
    }

    #[tokio::test]
    async fn test_batch_through_service() {
        let (service, _) = service();
        let pdf = UploadedFile::new("a.pdf", "application/pdf", b"%PDF-1.7\n".to_vec());
        let bad = UploadedFile::new("b.php", "text/plain", b"<?php".to_vec());
        let summary = service.validate_files(&[&pdf, &bad]).await;
        assert_eq!(summary.valid_count, 1);
        assert_eq!(summary.invalid_count, 1);
    }

    #[test]
    fn test_secure_filename() {
        let (service, _) = service();
        let name = service.generate_secure_filename("My Report (Final).docx");
        assert!(name.len() <= 100);
        assert!(name.ends_with(".docx"));
        assert!(!name.contains([' ', '(', ')']));
    }

    #[test]
    fn test_suspicious_activity_window() {
        let (service, clock) = service();
        let flags: Vec<bool> = (0..5)
            .map(|_| service.check_suspicious_activity("y", "login_attempt", json!({})))
            .collect();
        assert_eq!(flags, vec![false, false, false, false, true]);
        assert!(service.monitor().is_flagged("y", "login_attempt"));

        clock.advance(chrono::Duration::hours(1) + chrono::Duration::seconds(1));
        assert!(!service.monitor().is_flagged("y", "login_attempt"));
    }

    #[test]
    fn test_ticket_pipeline() {
        let (service, _) = service();
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = service.issue_csrf_token("session-1").unwrap();

        let request = SecurityRequest::new(Method::Post, "/tickets", "10.0.0.9")
            .with_header("Authorization", bearer("agent-1", exp))
            .with_header(CSRF_HEADER, token)
            .with_session("session-1")
            .with_json(json!({
                "title": "  Printer on fire ",
                "description": "<p onclick=\"x()\">Smoke</p><script>steal()</script>",
                "priority": "high",
            }));

        let out = service.run_middleware_pipeline("ticket_create", request).unwrap();
        assert_eq!(out.actor(), "agent-1");
        assert_eq!(out.body["title"], "Printer on fire");
        assert_eq!(out.body["description"], "<p>Smoke</p>");
    }

    #[test]
    fn test_search_limit_survives_subject_rotation() {
        let (service, _) = service();
        let exp = chrono::Utc::now().timestamp() + 3600;

        let allowed = (0..80)
            .filter(|n| {
                let request = SecurityRequest::new(Method::Get, "/search", "10.6.6.6")
                    .with_header("Authorization", bearer(&format!("user-{n}"), exp))
                    .with_json(json!({"q": "printer"}));
                service.run_middleware_pipeline("search", request).is_ok()
            })
            .count();
        assert_eq!(allowed, 50);
        assert!(service.monitor().is_flagged("10.6.6.6", "search_abuse"));
        assert!(!service.monitor().is_flagged("user-79", "search_abuse"));

        let other_client = SecurityRequest::new(Method::Get, "/search", "10.0.0.8")
            .with_header("Authorization", bearer("user-0", exp))
            .with_json(json!({"q": "printer"}));
        assert!(service.run_middleware_pipeline("search", other_client).is_ok());
    }

    #[test]
    fn test_pipeline_rejections() {
        let (service, _) = service();
        assert_eq!(
            service.pipeline("auth").unwrap().step_names(),
            vec!["rate_limit", "csrf", "sanitize", "validate", "suspicious_activity"]
        );
        assert_eq!(
            service.pipeline("search").unwrap().step_names(),
            vec!["authenticate", "rate_limit", "sanitize", "validate", "suspicious_activity"]
        );

        let unauthenticated = SecurityRequest::new(Method::Get, "/search", "10.0.0.9")
            .with_json(json!({"q": "printer"}));
        let err = service.run_middleware_pipeline("search", unauthenticated).unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(service.recent_events(1)[0].event_type, SecurityEventType::AuthFailed);

        let missing = SecurityRequest::new(Method::Get, "/", "10.0.0.9");
        assert!(matches!(
            service.run_middleware_pipeline("nope", missing),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_csrf_verification_events() {
        let (service, _) = service();
        let token = service.issue_csrf_token("s").unwrap();
        assert!(service.verify_csrf_token("s", &token).is_ok());
        assert!(service.verify_csrf_token("other", &token).is_err());
        assert_eq!(
            service.recent_events(1)[0].event_type,
            SecurityEventType::CsrfTokenInvalid
        );

        let mut config = SecurityConfig::default();
        config.csrf.enabled = false;
        let service = SecurityService::new(config).unwrap();
        assert!(service.issue_csrf_token("s").is_err());
        assert!(!service.pipeline("auth").unwrap().step_names().contains(&"csrf"));
    }

    #[tokio::test]
    async fn test_listeners() {
        let (service, _) = service();
        let (id, mut rx) = service.add_listener();
        service.check_suspicious_activity("z", "scraping", json!({"n": 1}));
        service.sanitize_input("<b>x</b><script>1</script>", SanitizationContext::Html);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, SecurityEventType::InputSanitized);
        assert!(service.remove_listener(id));
        assert!(!service.remove_listener(id));
        assert!(service.security_headers().iter().any(|(n, _)| *n == "Content-Security-Policy"));
    }

    #[tokio::test]
    async fn test_disk_uploads_under_production_config() {
        let service = production_service();
        let dir = tempfile::tempdir().unwrap();

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&64u32.to_be_bytes());
        png.extend_from_slice(&48u32.to_be_bytes());
        png.extend_from_slice(&[8, 6, 0, 0, 0]);
        std::fs::write(dir.path().join("diagram.png"), &png).unwrap();
        std::fs::write(dir.path().join("photo.jpg"), b"not really a jpeg").unwrap();

        let good = DiskFile::open(dir.path().join("diagram.png")).await.unwrap();
        let fake = DiskFile::open(dir.path().join("photo.jpg")).await.unwrap();

        let summary = service.validate_files(&[&good, &fake]).await;
        assert_eq!(summary.valid_count, 1);
        assert_eq!(summary.invalid_count, 1);
        assert_eq!(summary.verdicts[0].dimensions, Some((64, 48)));
        assert!(summary.verdicts[1].has_error(RejectionCode::SignatureMismatch));

        let rejected = service
            .recent_events(10)
            .into_iter()
            .filter(|e| e.event_type == SecurityEventType::FileRejected)
            .count();
        assert_eq!(rejected, 1);
    }

    #[test]
    fn test_login_abuse_is_blocked() {
        let service = production_service();
        let token = service.issue_csrf_token("sess").unwrap();

        let login = |password: Value| {
            SecurityRequest::new(Method::Post, "/login", "203.0.113.7")
                .with_session("sess")
                .with_header("X-CSRF-Token", token.clone())
                .with_json(json!({ "email": "a@example.com", "password": password }))
        };

        assert!(service.run_middleware_pipeline("auth", login(json!("hunter22"))).is_ok());

        // Wrong-typed passwords fail validation and count against the client
        for _ in 0..4 {
            let err = service.run_middleware_pipeline("auth", login(json!(12345))).unwrap_err();
            assert_eq!(err.status_code(), 422);
        }

        // Sixth auth request is over the default 5 per 15 minutes
        let err = service.run_middleware_pipeline("auth", login(json!("hunter22"))).unwrap_err();
        assert_eq!(err.status_code(), 429);
        assert!(service.monitor().is_flagged("203.0.113.7", "login_failure"));
        assert!(!service.check_rate_limit(&Operation::Auth, "203.0.113.7", None).allowed);
    }
}
