// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment history ledger entries.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Append-only record of a completed parcel payment.
///
/// Keyed by the parcel id, so a parcel has at most one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PaymentRecord {
    /// Document ID (same as `parcel_id`)
    pub id: String,
    pub parcel_id: String,
    /// Email of the paying user
    pub user_email: String,
    /// Amount in minor currency units
    pub amount: u64,
    /// Processor transaction reference
    pub transaction_id: String,
    pub payment_method: String,
    /// When the payment was recorded (RFC3339)
    pub payment_time: String,
}
