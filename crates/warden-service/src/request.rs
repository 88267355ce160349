//! Request model seen by the middleware pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use warden_core::{Error, Result};
use warden_guard::TokenClaims;

/// Header carrying the CSRF token on state-changing requests
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Requests that must not change state; CSRF checks skip them
    pub fn is_read_only(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::ValidationFailed {
                field: "method".to_string(),
                reasons: vec![format!("unsupported method '{}'", other)],
            }),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request flowing through the pipeline; steps may rewrite the body and
/// attach claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRequest {
    pub method: Method,
    pub path: String,
    /// Client identifier used before authentication (IP, device id)
    pub identifier: String,
    pub session_id: Option<String>,
    /// Header names are stored lowercased
    pub headers: BTreeMap<String, String>,
    pub body: Map<String, Value>,
    /// Set by the authentication step
    pub claims: Option<TokenClaims>,
}

impl SecurityRequest {
    pub fn new(method: Method, path: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            identifier: identifier.into(),
            session_id: None,
            headers: BTreeMap::new(),
            body: Map::new(),
            claims: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Builder: set the body from a JSON object; other values leave it empty
    pub fn with_json(mut self, body: Value) -> Self {
        if let Value::Object(map) = body {
            self.body = map;
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header("authorization")
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.header(CSRF_HEADER)
    }

    /// Token subject when claims are attached, otherwise the client
    /// identifier. The subject is unverified; abuse controls key on
    /// [`identifier`](Self::identifier) instead.
    pub fn actor(&self) -> &str {
        self.claims
            .as_ref()
            .and_then(TokenClaims::subject)
            .unwrap_or(&self.identifier)
    }
}
