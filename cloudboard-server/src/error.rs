//! Request-level error taxonomy for the REST surface.
//!
//! Side-effect failures (broadcast, notification, email) are deliberately
//! absent: once the store write succeeds they are logged where they happen
//! and never surfaced to the caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned to API callers.
///
/// Tenant isolation means "exists under another organization" and "does not
/// exist" both report [`ApiError::NotFound`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, malformed, or expired credential.
    #[error("unauthorized")]
    Unauthorized,
    /// Authenticated, but the role does not permit the operation.
    #[error("forbidden")]
    Forbidden,
    /// The referenced record is absent or outside the caller's tenant.
    #[error("not found")]
    NotFound,
    /// The request body failed validation.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
