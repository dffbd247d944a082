//! Registration token extractor.
//!
//! Write routes are gated by a single-use token issued by `GET /token` and
//! presented as `Authorization: Bearer <token>`. Extraction consumes the
//! token, so a handler that takes [`RegistrationToken`] can only run once
//! per issued token. Gating can be switched off per deployment.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request presented a live registration token, or that
/// gating is disabled.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationToken;

/// The bearer credential of an `Authorization` header, if any.
fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for RegistrationToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config().registration.require_token {
            return Ok(Self);
        }

        let Some(token) = bearer(parts) else {
            debug!("Write request without bearer token");
            return Err(AppError::Unauthorized("missing bearer token".to_string()));
        };

        if state.gate().consume(token).await {
            Ok(Self)
        } else {
            debug!("Write request with unknown, expired or used token");
            Err(AppError::Unauthorized("token rejected".to_string()))
        }
    }
}
