//! Warden Service
//!
//! The surface the host application calls: a [`SecurityService`] built
//! once from a [`SecurityConfig`], the middleware pipelines it assembles per
//! endpoint, and the request model those pipelines operate on.
//!
//! # Modules
//!
//! - `config`: every table the core consults, loaded and validated at startup
//! - `request`: method, headers, session and body of an inbound request
//! - `validation`: per-field rules compiled once per endpoint
//! - `pipeline`: middleware steps and their ordered composition
//! - `headers`: CSP and hardening response headers
//! - `service`: the facade tying the components together

pub mod config;
pub mod headers;
pub mod pipeline;
pub mod request;
pub mod service;
pub mod validation;

pub use config::{
    CsrfConfig, EndpointClass, EndpointConfig, Environment, EventConfig, SecurityConfig,
    TokenConfig, UploadConfig,
};
pub use headers::SecurityHeadersConfig;
pub use pipeline::{
    Authenticate, CsrfCheck, MiddlewarePipeline, MiddlewareStep, RateLimit, Sanitize,
    SchemaValidate, SuspiciousActivityCheck,
};
pub use request::{CSRF_HEADER, Method, SecurityRequest};
pub use service::SecurityService;
pub use validation::{FieldKind, FieldValidation, ValidationSchema};
