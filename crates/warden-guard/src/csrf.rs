//! Session-bound CSRF tokens
//!
//! Token layout: `<nonce>.<issued_at>.<mac>` where `mac` is
//! HMAC-SHA256(secret, `session_id|nonce.issued_at`), base64url encoded.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use tracing::debug;
use warden_core::{Clock, Error, Result, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Shortest secret accepted, in bytes
pub const MIN_SECRET_LEN: usize = 16;

const NONCE_LEN: usize = 16;

/// Allowed skew for tokens stamped slightly in the future
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Random secret suitable for development configurations
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues and verifies CSRF tokens
#[derive(Clone)]
pub struct CsrfProtector {
    secret: Vec<u8>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CsrfProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfProtector")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CsrfProtector {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Result<Self> {
        Self::with_clock(secret, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        secret: impl Into<Vec<u8>>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Configuration(format!(
                "CSRF secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if ttl <= Duration::zero() {
            return Err(Error::Configuration("CSRF token ttl must be positive".into()));
        }
        Ok(Self { secret, ttl, clock })
    }

    fn mac(&self, session_id: &str, body: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("HMAC key rejected: {}", e)))?;
        mac.update(session_id.as_bytes());
        mac.update(b"|");
        mac.update(body.as_bytes());
        Ok(mac)
    }

    /// Issue a token bound to a session
    pub fn issue(&self, session_id: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let body = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(nonce),
            self.clock.now().timestamp()
        );
        let tag = self.mac(session_id, &body)?.finalize().into_bytes();
        Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Verify a token for a session; every failure is [`Error::CsrfTokenInvalid`]
    pub fn verify(&self, session_id: &str, token: &str) -> Result<()> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(nonce), Some(issued), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::CsrfTokenInvalid);
        };

        let issued_at: i64 = issued.parse().map_err(|_| Error::CsrfTokenInvalid)?;
        let now = self.clock.now().timestamp();
        if issued_at > now + MAX_FUTURE_SKEW_SECS || now - issued_at > self.ttl.num_seconds() {
            debug!(session_id, "CSRF token outside its lifetime");
            return Err(Error::CsrfTokenInvalid);
        }

        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| Error::CsrfTokenInvalid)?;
        let body = format!("{}.{}", nonce, issued);
        self.mac(session_id, &body)?
            .verify_slice(&tag)
            .map_err(|_| Error::CsrfTokenInvalid)
    }
}
