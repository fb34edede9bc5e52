// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe API client for creating card payment intents.

use crate::config::Config;
use crate::error::AppError;
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const CURRENCY: &str = "usd";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    /// Create a client from the configured secret key and API base URL.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building Stripe HTTP client")?;

        Ok(Self {
            http,
            base_url: config.stripe_api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
        })
    }

    /// Create a card payment intent for `amount_in_cents` and return its
    /// client secret.
    pub async fn create_payment_intent(&self, amount_in_cents: u64) -> Result<String, AppError> {
        let url = format!("{}/payment_intents", self.base_url);
        let amount = amount_in_cents.to_string();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", CURRENCY),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await
            .map_err(|e| AppError::PaymentProcessor(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

            tracing::warn!(status = %status, message = %message, "Stripe rejected payment intent");
            return Err(AppError::PaymentProcessor(message));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| AppError::PaymentProcessor(format!("JSON parse error: {}", e)))?;

        tracing::info!(
            intent_id = %intent.id,
            amount = amount_in_cents,
            "Payment intent created"
        );

        intent.client_secret.ok_or_else(|| {
            AppError::PaymentProcessor("payment intent has no client secret".to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}
