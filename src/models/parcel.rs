// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parcel model and the delivery state machine.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Payment axis of a parcel. `Paid` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// Position of a parcel in the fulfillment pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    RiderAssign,
    InTransit,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::RiderAssign => "rider_assign",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    /// Statuses in which a parcel counts as an active rider assignment.
    pub const ACTIVE_ASSIGNMENT: [DeliveryStatus; 2] =
        [DeliveryStatus::RiderAssign, DeliveryStatus::InTransit];

    /// Whether moving from `self` to `next` is a legal edge.
    ///
    /// Re-applying the current status is accepted. `RiderAssign -> Pending`
    /// unassigns a rider before pickup.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, RiderAssign)
                    | (RiderAssign, Pending)
                    | (RiderAssign, InTransit)
                    | (InTransit, Delivered)
            )
    }
}

/// Shipment record stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Parcel {
    /// Document ID
    pub id: String,
    /// Email of the shipper who created the parcel
    pub created_by: String,

    // ─── Shipment details ────────────────────────────────────────
    #[serde(default)]
    pub title: Option<String>,
    /// "document" or "non-document"
    #[serde(default)]
    pub parcel_type: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Quoted delivery cost in minor currency units
    #[serde(default)]
    pub cost: Option<u64>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub sender_region: Option<String>,
    #[serde(default)]
    pub receiver_name: Option<String>,
    #[serde(default)]
    pub receiver_address: Option<String>,
    #[serde(default)]
    pub receiver_region: Option<String>,

    // ─── Workflow state ──────────────────────────────────────────
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
    #[serde(default)]
    pub assigned_rider_id: Option<String>,
    #[serde(default)]
    pub assigned_rider_name: Option<String>,
    #[serde(default)]
    pub assign_rider_email: Option<String>,

    // ─── Timestamps (RFC3339) ────────────────────────────────────
    pub created_at: String,
    #[serde(default)]
    pub payment_time: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}
