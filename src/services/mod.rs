// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod firebase_auth;
pub mod stripe;
pub mod workflow;

pub use firebase_auth::{FirebaseTokenVerifier, IdentityError, VerifiedPrincipal};
pub use stripe::StripeClient;
