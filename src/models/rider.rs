// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rider model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Administrative status of a rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    /// Registered, awaiting review
    Pending,
    /// Approved; promotes the matching user to `rider`
    Active,
    Available,
    OnDelivery,
    Offline,
    Unavailable,
    Rejected,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Pending => "pending",
            RiderStatus::Active => "active",
            RiderStatus::Available => "available",
            RiderStatus::OnDelivery => "on_delivery",
            RiderStatus::Offline => "offline",
            RiderStatus::Unavailable => "unavailable",
            RiderStatus::Rejected => "rejected",
        }
    }
}

/// Whether a rider is currently carrying a parcel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Idle,
    InDelivery,
}

/// Rider profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Rider {
    /// Document ID
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Warehouse the rider works out of
    #[serde(default)]
    pub warehouse: Option<String>,
    pub status: RiderStatus,
    #[serde(default)]
    pub work_status: WorkStatus,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}
