// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User signup, role lookup and admin role management.

use crate::db::{InsertResult, UpdateResult};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{require_admin, require_auth, AuthUser};
use crate::models::{User, UserRole};
use crate::services::workflow::{self, Signup};
use crate::AppState;
use axum::{
    extract::{Path, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/users", post(signup));

    let authenticated = Router::new()
        .route("/users/role", post(get_role))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Layers run outside-in, so auth is added last to run first.
    let admin = Router::new()
        .route("/users/search", get(search_users))
        .route("/users/{id}/role", patch(set_role))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(authenticated).merge(admin)
}

/// Returned when signing up an email that already has a user.
#[derive(Serialize)]
struct AlreadyExists {
    message: &'static str,
    inserted_id: bool,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Signup>,
) -> Result<Response> {
    match workflow::signup(state.db.as_ref(), body).await? {
        Some(id) => Ok(Json(InsertResult::new(id)).into_response()),
        None => Ok(Json(AlreadyExists {
            message: "User already exists",
            inserted_id: false,
        })
        .into_response()),
    }
}

#[derive(Deserialize)]
struct RoleQuery {
    email: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoleResponse {
    pub role: UserRole,
}

async fn get_role(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<RoleQuery>,
) -> Result<Json<RoleResponse>> {
    tracing::debug!(uid = %auth.uid, "Role lookup");

    let role = workflow::role_of(state.db.as_ref(), &body.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    Ok(Json(RoleResponse { role }))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    email: String,
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<User>>> {
    let users = workflow::search_users(state.db.as_ref(), &query.email).await?;
    Ok(Json(users))
}

#[derive(Deserialize)]
struct SetRoleBody {
    role: UserRole,
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SetRoleBody>,
) -> Result<Json<UpdateResult>> {
    let result = workflow::set_user_role(state.db.as_ref(), &id, body.role).await?;
    Ok(Json(result))
}
