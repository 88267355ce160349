//! Structural bearer-token inspection
//!
//! Checks that a token is shaped like a JWT (three base64url segments, a
//! JSON header naming a real algorithm, a JSON object payload) and that its
//! time claims are sane. The signature is not verified here; establishing
//! trust belongs to the identity provider.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use warden_core::{Clock, Error, Result, SystemClock};

/// Claims read from a token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiration time (seconds since epoch)
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,
    /// Not before
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    /// Every other claim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Best identifier for per-actor tables: `sub`, then `jti`
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.jti.as_deref())
    }
}

/// Structural JWT checker
#[derive(Clone)]
pub struct TokenInspector {
    leeway_secs: i64,
    require_exp: bool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInspector")
            .field("leeway_secs", &self.leeway_secs)
            .field("require_exp", &self.require_exp)
            .finish()
    }
}

impl Default for TokenInspector {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn rejected(reason: &str) -> Error {
    Error::AuthRequired(reason.to_string())
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| rejected(&format!("token {} is not base64url", name)))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(object)) => Ok(object),
        _ => Err(rejected(&format!("token {} is not a JSON object", name))),
    }
}

impl TokenInspector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leeway_secs: 60,
            require_exp: true,
            clock,
        }
    }

    /// Allowed clock skew for time claims
    pub fn with_leeway(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs.max(0);
        self
    }

    pub fn require_exp(mut self, require: bool) -> Self {
        self.require_exp = require;
        self
    }

    /// Inspect a raw token (an optional `Bearer ` prefix is accepted)
    pub fn inspect(&self, token: &str) -> Result<TokenClaims> {
        let token = token.trim();
        let token = token
            .strip_prefix("Bearer ")
            .or_else(|| token.strip_prefix("bearer "))
            .unwrap_or(token)
            .trim();
        if token.is_empty() {
            return Err(rejected("missing token"));
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(rejected("token must have three non-empty segments"));
        }

        let header = decode_segment(segments[0], "header")?;
        match header.get("alg").and_then(Value::as_str) {
            Some(alg) if !alg.eq_ignore_ascii_case("none") => {}
            _ => return Err(rejected("token header has no usable alg")),
        }

        let payload = decode_segment(segments[1], "payload")?;
        let claims: TokenClaims = serde_json::from_value(Value::Object(payload))
            .map_err(|_| rejected("token claims are malformed"))?;

        self.check_times(&claims)?;
        debug!(sub = ?claims.sub, "Token passed structural inspection");
        Ok(claims)
    }

    fn check_times(&self, claims: &TokenClaims) -> Result<()> {
        let now = self.clock.now().timestamp();
        let leeway = self.leeway_secs;

        match claims.exp {
            Some(exp) if exp.saturating_add(leeway) < now => return Err(rejected("token expired")),
            None if self.require_exp => return Err(rejected("token has no exp claim")),
            _ => {}
        }

        if let Some(iat) = claims.iat {
            if iat > now.saturating_add(leeway) {
                return Err(rejected("token issued in the future"));
            }
            if claims.exp.is_some_and(|exp| exp < iat) {
                return Err(rejected("token expires before it was issued"));
            }
        }

        if let Some(nbf) = claims.nbf {
            if nbf > now.saturating_add(leeway) {
                return Err(rejected("token not yet valid"));
            }
        }

        Ok(())
    }
}
