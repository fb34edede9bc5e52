// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parcel-Dispatch: backend for a parcel-delivery marketplace
//!
//! This crate provides the REST API through which shippers create and pay
//! for parcels, admins manage riders and roles, and riders are assigned
//! parcels and report delivery progress.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{FirebaseTokenVerifier, StripeClient};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub identity: FirebaseTokenVerifier,
    pub payments: StripeClient,
}
