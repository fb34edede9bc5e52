// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use parcel_dispatch::config::Config;
use parcel_dispatch::db::{FirestoreDb, MemoryDb, Store};
use parcel_dispatch::models::UserRole;
use parcel_dispatch::routes::create_router;
use parcel_dispatch::services::{FirebaseTokenVerifier, StripeClient};
use parcel_dispatch::AppState;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

const TEST_KID: &str = "test-signing-key";
const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_rsa_private.pem");
const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/test_rsa_public.pem");

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

fn build_app(config: Config, db: Arc<dyn Store>) -> (Router, Arc<AppState>) {
    let decoding_key =
        DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).expect("valid test public key");
    let identity = FirebaseTokenVerifier::new_with_static_key(&config, TEST_KID, decoding_key)
        .expect("static verifier");
    let payments = StripeClient::new(&config).expect("stripe client");

    let state = Arc::new(AppState {
        config,
        db,
        identity,
        payments,
    });

    (create_router(state.clone()), state)
}

/// Create a test app over the in-memory store.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    build_app(Config::default(), Arc::new(MemoryDb::new()))
}

/// Create a test app whose store is offline; every store call answers 503.
#[allow(dead_code)]
pub fn create_offline_app() -> (Router, Arc<AppState>) {
    build_app(Config::default(), Arc::new(FirestoreDb::new_mock()))
}

/// Create a test app that talks to a fake payment processor.
#[allow(dead_code)]
pub fn create_test_app_with_stripe(base_url: &str) -> (Router, Arc<AppState>) {
    let config = Config {
        stripe_api_base: base_url.to_string(),
        ..Config::default()
    };
    build_app(config, Arc::new(MemoryDb::new()))
}

#[derive(Serialize)]
struct IdTokenClaims<'a> {
    iss: String,
    aud: &'a str,
    sub: &'a str,
    iat: u64,
    exp: u64,
    auth_time: u64,
    email: &'a str,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn sign(claims: &impl Serialize, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// Create a Firebase-style ID token for `email` accepted by the test app.
#[allow(dead_code)]
pub fn create_id_token(config: &Config, email: &str) -> String {
    let now = now_secs();
    let claims = IdTokenClaims {
        iss: format!("https://securetoken.google.com/{}", config.firebase_project_id),
        aud: &config.firebase_project_id,
        sub: "uid-123",
        iat: now,
        exp: now + 3600,
        auth_time: now,
        email,
    };
    sign(&claims, TEST_KID)
}

/// Create an ID token that is already expired.
#[allow(dead_code)]
pub fn create_expired_id_token(config: &Config, email: &str) -> String {
    let now = now_secs();
    let claims = IdTokenClaims {
        iss: format!("https://securetoken.google.com/{}", config.firebase_project_id),
        aud: &config.firebase_project_id,
        sub: "uid-123",
        iat: now - 7200,
        exp: now - 3600,
        auth_time: now - 7200,
        email,
    };
    sign(&claims, TEST_KID)
}

/// Create an ID token for another Firebase project.
#[allow(dead_code)]
pub fn create_foreign_id_token(email: &str) -> String {
    let now = now_secs();
    let claims = IdTokenClaims {
        iss: "https://securetoken.google.com/someone-else".to_string(),
        aud: "someone-else",
        sub: "uid-123",
        iat: now,
        exp: now + 3600,
        auth_time: now,
        email,
    };
    sign(&claims, TEST_KID)
}

/// Store `email` as an admin user.
#[allow(dead_code)]
pub async fn seed_admin(state: &AppState, email: &str) {
    state
        .db
        .upsert_user_role(email, UserRole::Admin, "2026-01-01T00:00:00.000000Z")
        .await
        .unwrap();
}

/// Send a request and return the status with the JSON body (or `Null`).
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
