//! Access token payload inspection
//!
//! Gateway access tokens are compact JWTs. This module decodes the payload
//! segment (base64url, unpadded) without verifying the signature; the
//! gateway is the authority on token validity, the client only reads the
//! claims that drive session decisions: the token class (`usrtype`) and
//! expiry (`exp`).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// `usrtype` value marking guest credentials.
const ANONYMOUS_USER_TYPE: &str = "anon";

/// Claims this client reads from an access token payload.
///
/// Every field is optional: older gateway versions omit some of them, and
/// unknown claims are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Username, set on named-user tokens
    pub usr: Option<String>,
    /// Token class; `"anon"` for guest credentials
    pub usrtype: Option<String>,
    /// Expiry as a unix timestamp in seconds
    pub exp: Option<u64>,
}

impl TokenClaims {
    /// Decode the claims from a compact JWT.
    pub fn parse(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::TokenParse(format!(
                "expected 3 token segments, got {}",
                parts.len()
            )));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| Error::TokenParse(format!("invalid payload encoding: {e}")))?;

        serde_json::from_slice(&payload)
            .map_err(|e| Error::TokenParse(format!("invalid payload JSON: {e}")))
    }

    /// Whether this token carries a guest credential.
    pub fn is_anonymous(&self) -> bool {
        self.usrtype.as_deref() == Some(ANONYMOUS_USER_TYPE)
    }

    /// Whether the token expires within `leeway_secs` of `now_secs`.
    /// Tokens without an `exp` claim are treated as already expired.
    pub fn expires_within(&self, now_secs: u64, leeway_secs: u64) -> bool {
        match self.exp {
            Some(exp) => exp <= now_secs + leeway_secs,
            None => true,
        }
    }
}

/// Whether the given token is a guest credential. Undecodable tokens are
/// treated as named-user tokens so a malformed token never silently demotes
/// a session.
pub fn is_anonymous_token(token: &str) -> bool {
    match TokenClaims::parse(token) {
        Ok(claims) => claims.is_anonymous(),
        Err(e) => {
            warn!(error = %e, "could not inspect token class, assuming named user");
            false
        }
    }
}
