// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment history and the payment-intent bridge.

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::{require_auth, AuthUser};
use crate::models::PaymentRecord;
use crate::AppState;
use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authenticated = Router::new()
        .route("/payments", get(list_payments))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .merge(authenticated)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentsQuery {
    user_email: Option<String>,
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<PaymentsQuery>,
) -> Result<Json<Vec<PaymentRecord>>> {
    tracing::debug!(uid = %auth.uid, "Listing payment history");
    let user_email = query.user_email.filter(|e| !e.is_empty());
    let records = state.db.list_payments(user_email.as_deref()).await?;
    Ok(Json(records))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    amount_in_cents: u64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: String,
}

async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if body.amount_in_cents == 0 {
        return Err(AppError::BadRequest(
            "amountInCents must be a positive integer.".to_string(),
        ));
    }

    let client_secret = state
        .payments
        .create_payment_intent(body.amount_in_cents)
        .await?;

    Ok(Json(CheckoutResponse { client_secret }))
}
