//! Middleware pipeline
//!
//! Steps run in order over a mutable [`SecurityRequest`]. The first error
//! aborts the remaining steps; before it is returned the pipeline publishes
//! it as a security event and, when failure tracking is configured, records
//! the rejection in the suspicious-activity monitor.
//!
//! Rate-limit and activity windows are keyed on the request's client
//! identifier. Token subjects are never verified here, so they only appear
//! in logs and event data.

use crate::request::SecurityRequest;
use crate::validation::ValidationSchema;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::{Error, Operation, Result};
use warden_guard::{
    CsrfProtector, RateLimiter, SecurityEventBus, SecurityEventType, SuspiciousActivityMonitor,
    TokenInspector,
};
use warden_sanitize::{FormSchema, sanitize_form_data};

/// One request-processing step
pub trait MiddlewareStep: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect or rewrite the request; an error stops the pipeline
    fn apply(&self, request: &mut SecurityRequest) -> Result<()>;
}

/// Requires a structurally valid bearer token and attaches its claims
pub struct Authenticate {
    inspector: TokenInspector,
}

impl Authenticate {
    pub fn new(inspector: TokenInspector) -> Self {
        Self { inspector }
    }
}

impl MiddlewareStep for Authenticate {
    fn name(&self) -> &str {
        "authenticate"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        let header = request
            .authorization()
            .ok_or_else(|| Error::AuthRequired("missing authorization header".to_string()))?;
        let claims = self.inspector.inspect(header)?;
        request.claims = Some(claims);
        Ok(())
    }
}

/// Admission control keyed by the client identifier
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    operation: Operation,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, operation: Operation) -> Self {
        Self { limiter, operation }
    }
}

impl MiddlewareStep for RateLimit {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        self.limiter
            .check_limit(&self.operation, &request.identifier, None)
            .into_result(&self.operation)
            .map(|_| ())
    }
}

/// Session-bound CSRF check; read-only methods pass untouched
pub struct CsrfCheck {
    protector: Arc<CsrfProtector>,
}

impl CsrfCheck {
    pub fn new(protector: Arc<CsrfProtector>) -> Self {
        Self { protector }
    }
}

impl MiddlewareStep for CsrfCheck {
    fn name(&self) -> &str {
        "csrf"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        if request.method.is_read_only() {
            return Ok(());
        }
        let session = request.session_id.as_deref().ok_or(Error::CsrfTokenInvalid)?;
        let token = request.csrf_token().ok_or(Error::CsrfTokenInvalid)?;
        self.protector.verify(session, token)
    }
}

/// Replaces the body with its sanitized form
pub struct Sanitize {
    schema: Arc<FormSchema>,
}

impl Sanitize {
    pub fn new(schema: Arc<FormSchema>) -> Self {
        Self { schema }
    }
}

impl MiddlewareStep for Sanitize {
    fn name(&self) -> &str {
        "sanitize"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        request.body = sanitize_form_data(&request.body, &self.schema);
        Ok(())
    }
}

/// Per-field validation of the (already sanitized) body
pub struct SchemaValidate {
    schema: Arc<ValidationSchema>,
}

impl SchemaValidate {
    pub fn new(schema: Arc<ValidationSchema>) -> Self {
        Self { schema }
    }
}

impl MiddlewareStep for SchemaValidate {
    fn name(&self) -> &str {
        "validate"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        self.schema.validate(&request.body)
    }
}

/// Refuses clients already flagged for the endpoint's activity
pub struct SuspiciousActivityCheck {
    monitor: Arc<SuspiciousActivityMonitor>,
    activity: String,
}

impl SuspiciousActivityCheck {
    pub fn new(monitor: Arc<SuspiciousActivityMonitor>, activity: impl Into<String>) -> Self {
        Self {
            monitor,
            activity: activity.into(),
        }
    }
}

impl MiddlewareStep for SuspiciousActivityCheck {
    fn name(&self) -> &str {
        "suspicious_activity"
    }

    fn apply(&self, request: &mut SecurityRequest) -> Result<()> {
        let client = request.identifier.as_str();
        if !self.monitor.is_flagged(client, &self.activity) {
            return Ok(());
        }
        Err(Error::SuspiciousActivity {
            identifier: client.to_string(),
            activity: self.activity.clone(),
            occurrences: self.monitor.occurrences(client, &self.activity),
        })
    }
}

/// Event published for a step failure
fn event_type_for(error: &Error) -> SecurityEventType {
    match error {
        Error::RateLimitExceeded { .. } => SecurityEventType::RateLimitExceeded,
        Error::AuthRequired(_) => SecurityEventType::AuthFailed,
        Error::CsrfTokenInvalid => SecurityEventType::CsrfTokenInvalid,
        Error::ValidationFailed { .. } => SecurityEventType::ValidationFailed,
        Error::Sanitization(_) => SecurityEventType::SanitizationFailed,
        _ => SecurityEventType::MiddlewareRejected,
    }
}

/// Ordered chain of steps for one endpoint
pub struct MiddlewarePipeline {
    name: String,
    steps: Vec<Arc<dyn MiddlewareStep>>,
    events: Arc<SecurityEventBus>,
    failures: Option<(Arc<SuspiciousActivityMonitor>, String)>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish_non_exhaustive()
    }
}

impl MiddlewarePipeline {
    pub fn new(name: impl Into<String>, events: Arc<SecurityEventBus>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            events,
            failures: None,
        }
    }

    /// Append a step
    pub fn step(mut self, step: impl MiddlewareStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Record every rejection as `activity` for the request's client
    pub fn track_failures(
        mut self,
        monitor: Arc<SuspiciousActivityMonitor>,
        activity: impl Into<String>,
    ) -> Self {
        self.failures = Some((monitor, activity.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order
    pub fn run(&self, mut request: SecurityRequest) -> Result<SecurityRequest> {
        for step in &self.steps {
            if let Err(error) = step.apply(&mut request) {
                self.reject(step.name(), &request, &error);
                return Err(error);
            }
        }
        debug!(
            pipeline = %self.name,
            actor = request.actor(),
            path = %request.path,
            "Request passed middleware"
        );
        Ok(request)
    }

    fn reject(&self, step: &str, request: &SecurityRequest, error: &Error) {
        let actor = request.actor();
        warn!(
            pipeline = %self.name,
            step,
            client = %request.identifier,
            actor,
            code = error.code(),
            "Request rejected: {}",
            error
        );

        self.events.emit(
            event_type_for(error),
            json!({
                "pipeline": self.name,
                "step": step,
                "identifier": request.identifier,
                "actor": actor,
                "method": request.method.as_str(),
                "path": request.path,
                "code": error.code(),
                "status": error.status_code(),
                "detail": error.to_string(),
            }),
        );

        // A flagged client is already being refused; counting those refusals
        // would keep the flag alive forever
        if matches!(error, Error::SuspiciousActivity { .. }) {
            return;
        }
        if let Some((monitor, activity)) = &self.failures {
            monitor.check(
                &request.identifier,
                activity,
                json!({ "pipeline": self.name, "step": step, "code": error.code() }),
            );
        }
    }
}
