// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity gate and authorization checks.

use crate::error::AppError;
use crate::models::UserRole;
use crate::services::IdentityError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Caller identity attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

impl AuthUser {
    /// Self-match check: a supplied `user_email` must be the caller's own.
    pub fn ensure_self(&self, user_email: Option<&str>) -> Result<(), AppError> {
        match user_email {
            Some(email) if email != self.email => {
                tracing::warn!(
                    uid = %self.uid,
                    requested = email,
                    "Caller asked for another user's data"
                );
                Err(AppError::Forbidden)
            }
            _ => Ok(()),
        }
    }
}

/// Middleware that requires a valid Firebase ID token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = state
        .identity
        .verify_bearer(request.headers().get(header::AUTHORIZATION))
        .await
        .map_err(|e| match e {
            IdentityError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "Rejected request without credential");
                AppError::Unauthorized
            }
            IdentityError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "ID token verification failed");
                AppError::Forbidden
            }
            IdentityError::Transient(reason) => {
                AppError::Internal(anyhow::anyhow!("identity key fetch failed: {reason}"))
            }
        })?;

    request.extensions_mut().insert(AuthUser {
        uid: principal.uid,
        email: principal.email,
    });

    Ok(next.run(request).await)
}

/// Middleware that requires the authenticated caller to be an admin.
///
/// Must run after [`require_auth`]. A caller with no user record is not an
/// admin.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthorized)?;

    let role = state
        .db
        .find_user_by_email(&auth.email)
        .await?
        .map(|u| u.role);

    if role != Some(UserRole::Admin) {
        tracing::warn!(uid = %auth.uid, "Non-admin caller on admin route");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
