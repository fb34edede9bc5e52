// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parcel lifecycle routes: creation, payment, rider assignment and
//! delivery progress.

use crate::db::{AssignmentResult, DeleteResult, InsertResult, ParcelFilter, UpdateResult};
use crate::error::Result;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{require_auth, AuthUser};
use crate::models::{DeliveryStatus, Parcel, PaymentStatus};
use crate::services::workflow::{self, ParcelDraft, PaymentConfirmation};
use crate::AppState;
use axum::{
    extract::{Path, State},
    middleware,
    routing::{delete, get, patch},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authenticated = Router::new()
        .route("/parcels", get(list_parcels))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/parcels", patch(mark_paid).post(create_parcel))
        .route("/parcels/byStatus", get(parcels_by_status))
        .route("/parcels/rider/{rider_id}/assigned", get(assigned_parcels))
        .route("/parcels/{id}/assign", patch(assign_rider))
        .route("/parcels/{id}", delete(delete_parcel))
        .route("/parcel/{id}/rider", patch(update_delivery_status))
        .merge(authenticated)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParcelQuery {
    user_email: Option<String>,
    parcel_id: Option<String>,
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ParcelQuery>,
) -> Result<Json<Vec<Parcel>>> {
    let user_email = query.user_email.filter(|e| !e.is_empty());
    auth.ensure_self(user_email.as_deref())?;

    let parcels = workflow::find_parcels(
        state.db.as_ref(),
        user_email,
        query.parcel_id.filter(|id| !id.is_empty()),
    )
    .await?;
    Ok(Json(parcels))
}

#[derive(Deserialize)]
struct StatusQuery {
    payment_status: Option<PaymentStatus>,
    delivery_status: Option<DeliveryStatus>,
}

async fn parcels_by_status(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<Vec<Parcel>>> {
    let parcels = state
        .db
        .list_parcels(&ParcelFilter {
            payment_status: query.payment_status,
            delivery_status: query.delivery_status,
            ..Default::default()
        })
        .await?;
    Ok(Json(parcels))
}

async fn assigned_parcels(
    State(state): State<Arc<AppState>>,
    Path(rider_id): Path<String>,
) -> Result<Json<Vec<Parcel>>> {
    let parcels = workflow::active_assignments(state.db.as_ref(), &rider_id).await?;
    Ok(Json(parcels))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    ApiJson(draft): ApiJson<ParcelDraft>,
) -> Result<Json<InsertResult>> {
    let id = workflow::create_parcel(state.db.as_ref(), draft).await?;
    Ok(Json(InsertResult::new(id)))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MarkPaidResponse {
    pub message: String,
    pub inserted_id: String,
}

async fn mark_paid(
    State(state): State<Arc<AppState>>,
    ApiJson(confirmation): ApiJson<PaymentConfirmation>,
) -> Result<Json<MarkPaidResponse>> {
    let inserted_id = workflow::mark_paid(state.db.as_ref(), confirmation).await?;
    Ok(Json(MarkPaidResponse {
        message: "Parcel marked as paid and payment recorded.".to_string(),
        inserted_id,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody {
    rider_id: String,
    #[serde(default = "default_assign_status", alias = "delivery_status")]
    delivery_status: DeliveryStatus,
}

fn default_assign_status() -> DeliveryStatus {
    DeliveryStatus::RiderAssign
}

async fn assign_rider(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> Result<Json<AssignmentResult>> {
    let result = workflow::assign_rider(
        state.db.as_ref(),
        &parcel_id,
        &body.rider_id,
        body.delivery_status,
    )
    .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct DeliveryBody {
    delivery_status: DeliveryStatus,
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<String>,
    ApiJson(body): ApiJson<DeliveryBody>,
) -> Result<Json<UpdateResult>> {
    let result =
        workflow::update_delivery_status(state.db.as_ref(), &parcel_id, body.delivery_status)
            .await?;
    Ok(Json(result))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<String>,
) -> Result<Json<DeleteResult>> {
    let result = workflow::delete_parcel(state.db.as_ref(), &parcel_id).await?;
    Ok(Json(result))
}
