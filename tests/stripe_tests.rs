// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment bridge tests against a fake processor.

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

#[tokio::test]
async fn test_checkout_returns_client_secret() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(header("authorization", "Bearer sk_test_dummy"))
        .and(body_string_contains("amount=1500"))
        .and(body_string_contains("currency=usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "object": "payment_intent",
            "client_secret": "pi_123_secret_abc"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _) = common::create_test_app_with_stripe(&mock_server.uri());
    let (status, body) = common::send(
        &app,
        "POST",
        "/create-checkout-session",
        None,
        Some(json!({"amountInCents": 1500})),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({"clientSecret": "pi_123_secret_abc"}));
}

#[tokio::test]
async fn test_processor_error_message_is_passed_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "type": "invalid_request_error",
                "message": "Amount must be at least 50 cents"
            }
        })))
        .mount(&mock_server)
        .await;

    let (app, _) = common::create_test_app_with_stripe(&mock_server.uri());
    let (status, body) = common::send(
        &app,
        "POST",
        "/create-checkout-session",
        None,
        Some(json!({"amountInCents": 10})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Amount must be at least 50 cents");
}

#[tokio::test]
async fn test_zero_or_missing_amount_is_rejected_locally() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (app, _) = common::create_test_app_with_stripe(&mock_server.uri());

    let (status, _) = common::send(
        &app,
        "POST",
        "/create-checkout-session",
        None,
        Some(json!({"amountInCents": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        common::send(&app, "POST", "/create-checkout-session", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
