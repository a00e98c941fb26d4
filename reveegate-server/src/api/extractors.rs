//! Custom Axum extractors.
//!
//! Provides:
//! - `AdminAuth`: validates the admin JWT from `Authorization: Bearer …`
//!   (used by the Admin API).
//! - `SourceIp`: best-effort caller address for webhook audit logs.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use reveegate_core::auth::{AuthError, Identity};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// AdminAuth: Admin API authentication via bearer JWT
// ---------------------------------------------------------------------------

/// Identity of an authenticated admin.
pub struct AdminAuth(pub Identity);

/// Errors returned by the [`AdminAuth`] extractor.
#[derive(Debug)]
pub struct AdminAuthError(AuthError);

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let message = match self.0 {
            AuthError::Missing => "missing bearer token",
            AuthError::Invalid => "invalid token",
            AuthError::Expired => "token expired",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

/// Token of an `Authorization: Bearer …` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AdminAuthError(AuthError::Missing))?;
        let identity = state.admin_auth.validate(token).map_err(|e| {
            tracing::warn!(error = %e, "Admin API: rejected token");
            AdminAuthError(e)
        })?;
        Ok(AdminAuth(identity))
    }
}

// ---------------------------------------------------------------------------
// SourceIp: caller address for audit
// ---------------------------------------------------------------------------

/// First `X-Forwarded-For` hop, else the peer address. Never rejects.
pub struct SourceIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for SourceIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };
        Ok(SourceIp(forwarded.or_else(peer)))
    }
}
