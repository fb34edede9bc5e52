// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parcel-Dispatch API Server
//!
//! REST backend for parcel creation, payment, rider assignment and
//! delivery tracking.

use parcel_dispatch::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryDb, Store},
    services::{FirebaseTokenVerifier, StripeClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Parcel-Dispatch API");

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let identity = FirebaseTokenVerifier::new(&config)?;
    let payments = StripeClient::new(&config)?;

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        identity,
        payments,
    });

    // Build router
    let app = parcel_dispatch::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parcel_dispatch=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
