//! Session authentication for REST requests and WebSocket handshakes.
//!
//! Clients present a signed session token in a `token=` cookie. The token is
//! a base64url JSON claims payload plus a keyed SHA-256 tag over it; the
//! verifier checks the tag in constant time, then the expiry, then resolves
//! the referenced user. Any failure along the way collapses to Unauthorized
//! at the API boundary so nothing about the token's state leaks.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Role;
use crate::state::AppState;

/// Name of the session cookie, part of the browser contract.
const SESSION_COOKIE: &str = "token";

/// Reasons a credential fails verification. Collapsed to a generic
/// Unauthorized before anything reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `token=` cookie on the request.
    #[error("missing session cookie")]
    MissingCookie,
    /// The token is not two base64url segments of JSON claims.
    #[error("malformed session token")]
    Malformed,
    /// The signature does not match the claims payload.
    #[error("session token signature mismatch")]
    BadSignature,
    /// The token's expiry is in the past.
    #[error("session token expired")]
    Expired,
    /// The claims reference a user that is not provisioned.
    #[error("unknown user")]
    UnknownUser,
    /// Claims serialization failed while issuing a token.
    #[error("failed to encode session claims: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Signed claims carried inside a session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    user_id: String,
    /// Expiry as unix seconds.
    exp: i64,
}

/// Key material for signing and verifying session tokens, derived from the
/// configured secret.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; 32],
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl SessionKey {
    /// Derives a key from the configured secret string.
    #[must_use]
    pub fn derive(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"cloudboard-session-v1");
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// Issues a signed token for `user_id` expiring `ttl_secs` from now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encode`] if the claims cannot be serialized.
    pub fn issue(&self, user_id: &str, ttl_secs: u64) -> Result<String, AuthError> {
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            exp: Utc::now().timestamp() + i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        };
        let payload = serde_json::to_vec(&claims)?;
        let tag = self.tag(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verifies a token's signature and expiry, returning the user id it
    /// was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Malformed`], [`AuthError::BadSignature`], or
    /// [`AuthError::Expired`].
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (payload_b64, tag_b64) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| AuthError::Malformed)?;

        if !constant_time_eq(&self.tag(&payload), &tag) {
            return Err(AuthError::BadSignature);
        }

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims.user_id)
    }

    /// Keyed digest over a claims payload.
    fn tag(&self, payload: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(b".");
        hasher.update(payload);
        hasher.finalize().into()
    }
}

/// Compares two byte strings without early exit on mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extracts the session token from a `Cookie` header value.
///
/// Mirrors the browser contract: cookies are `; `-separated `name=value`
/// pairs and the session one is named `token`.
#[must_use]
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header.split("; ").find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// Immutable session context attached to each authenticated request or
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated user id.
    pub user_id: String,
    /// Tenant the user belongs to.
    pub org_id: String,
    /// Role within the organization.
    pub role: Role,
}

impl AuthContext {
    /// Checks that the session's role is one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] otherwise.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Resolves the request headers to an authenticated session context.
///
/// # Errors
///
/// Returns an [`AuthError`] naming the exact failure; callers map it to a
/// generic Unauthorized.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let cookie_header = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCookie)?;
    let token = token_from_cookie_header(cookie_header).ok_or(AuthError::MissingCookie)?;

    let user_id = state.session_key.verify(token)?;
    let user = state
        .users
        .get(&user_id)
        .await
        .ok_or(AuthError::UnknownUser)?;

    Ok(AuthContext {
        user_id: user.id,
        org_id: user.org_id,
        role: user.role,
    })
}

impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).await.map_err(|e| {
            tracing::debug!(error = %e, "request authentication failed");
            ApiError::Unauthorized
        })
    }
}
