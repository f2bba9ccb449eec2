//! Local introspection of access tokens.
//!
//! The server is free to hand out opaque tokens, but when it issues JWTs the
//! `exp` claim is a second opinion on when the token lapses. Signatures are
//! not checked here; the server remains the authority.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// The token does not have the three dot-separated JWT segments.
    #[error("token is not a JWT")]
    NotJwt,

    /// The token looks like a JWT but its payload could not be read.
    #[error("malformed JWT: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Decode the `exp` claim of a JWT into an absolute instant.
///
/// Returns `ClaimError::NotJwt` for opaque tokens, in which case callers
/// should rely on the stored expiry. Any other failure is
/// `ClaimError::Malformed`, and callers treat the token as already expired.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, ClaimError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ClaimError::NotJwt);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| ClaimError::Malformed(format!("payload is not base64url: {}", e)))?;

    let claim: ExpiryClaim = serde_json::from_slice(&payload)
        .map_err(|e| ClaimError::Malformed(format!("payload is not a claims object: {}", e)))?;

    let exp = claim
        .exp
        .ok_or_else(|| ClaimError::Malformed("missing exp claim".to_string()))?;

    Utc.timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| ClaimError::Malformed(format!("exp out of range: {}", exp)))
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"user_id":"u1","exp":{}}}"#, exp));
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}
