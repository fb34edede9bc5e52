// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rider registration, listing and status management.

use crate::db::{InsertResult, RiderFilter, UpdateResult};
use crate::error::Result;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{require_admin, require_auth};
use crate::models::{Rider, RiderStatus};
use crate::services::workflow::{self, RiderApplication};
use crate::AppState;
use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new().route("/riders", get(list_riders).post(register_rider));

    let admin = Router::new()
        .route("/riders/{id}", patch(set_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(admin)
}

#[derive(Deserialize)]
struct RiderQuery {
    status: Option<RiderStatus>,
    warehouse: Option<String>,
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RiderQuery>,
) -> Result<Json<Vec<Rider>>> {
    let riders = state
        .db
        .list_riders(&RiderFilter {
            status: query.status,
            warehouse: query.warehouse.filter(|w| !w.is_empty()),
        })
        .await?;
    Ok(Json(riders))
}

async fn register_rider(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RiderApplication>,
) -> Result<Json<InsertResult>> {
    let id = workflow::register_rider(state.db.as_ref(), body).await?;
    Ok(Json(InsertResult::new(id)))
}

#[derive(Deserialize)]
struct StatusBody {
    status: RiderStatus,
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> Result<Json<UpdateResult>> {
    let result = workflow::set_rider_status(state.db.as_ref(), &id, body.status).await?;
    Ok(Json(result))
}
