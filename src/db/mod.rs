// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Handlers talk to a [`Store`]; the production backend is Firestore and a
//! process-local backend serves local development and tests.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use self::memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    DeliveryStatus, Parcel, PaymentRecord, PaymentStatus, Rider, RiderStatus, User, UserRole,
};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const RIDERS: &str = "riders";
    pub const PARCELS: &str = "parcels";
    /// Payment ledger (keyed by parcel id)
    pub const PAYMENT_HISTORY: &str = "payment_history";
}

// ─── Query Filters ───────────────────────────────────────────────

/// Conjunctive parcel filter. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ParcelFilter {
    pub id: Option<String>,
    pub created_by: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub assign_rider_email: Option<String>,
    /// Restrict to any of these delivery statuses.
    pub delivery_status_in: Option<Vec<DeliveryStatus>>,
}

impl ParcelFilter {
    /// Whether a parcel satisfies every set field.
    pub fn matches(&self, parcel: &Parcel) -> bool {
        self.id.as_ref().is_none_or(|v| *v == parcel.id)
            && self.created_by.as_ref().is_none_or(|v| *v == parcel.created_by)
            && self
                .payment_status
                .is_none_or(|v| v == parcel.payment_status)
            && self
                .delivery_status
                .is_none_or(|v| v == parcel.delivery_status)
            && self
                .assign_rider_email
                .as_ref()
                .is_none_or(|v| parcel.assign_rider_email.as_ref() == Some(v))
            && self
                .delivery_status_in
                .as_ref()
                .is_none_or(|set| set.contains(&parcel.delivery_status))
    }
}

/// Rider filter. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RiderFilter {
    pub status: Option<RiderStatus>,
    pub warehouse: Option<String>,
}

impl RiderFilter {
    pub fn matches(&self, rider: &Rider) -> bool {
        self.status.is_none_or(|s| s == rider.status)
            && self
                .warehouse
                .as_ref()
                .is_none_or(|w| rider.warehouse.as_ref() == Some(w))
    }
}

// ─── Write Results ───────────────────────────────────────────────

/// Result of inserting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct InsertResult {
    pub acknowledged: bool,
    pub inserted_id: String,
}

impl InsertResult {
    pub fn new(inserted_id: impl Into<String>) -> Self {
        Self {
            acknowledged: true,
            inserted_id: inserted_id.into(),
        }
    }
}

/// Result of updating (or upserting) one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u32,
    pub modified_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
}

impl UpdateResult {
    pub fn unmatched() -> Self {
        Self {
            acknowledged: true,
            ..Default::default()
        }
    }

    pub fn matched(modified: bool) -> Self {
        Self {
            acknowledged: true,
            matched_count: 1,
            modified_count: u32::from(modified),
            upserted_id: None,
        }
    }

    pub fn upserted(id: impl Into<String>) -> Self {
        Self {
            acknowledged: true,
            upserted_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Result of deleting by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u32,
}

/// Outcome of a rider assignment: one result per touched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AssignmentResult {
    pub parcel: UpdateResult,
    pub rider: UpdateResult,
}

/// Rider after a status update, and whether the status actually changed.
#[derive(Debug, Clone)]
pub struct RiderStatusChange {
    pub rider: Rider,
    pub modified: bool,
}

/// Rider assignment request as seen by the store.
#[derive(Debug, Clone)]
pub struct RiderAssignment {
    pub parcel_id: String,
    pub rider_id: String,
    pub delivery_status: DeliveryStatus,
    pub at: String,
}

// ─── Store ───────────────────────────────────────────────────────

/// Persistence operations used by the HTTP layer.
///
/// Multi-document operations (`mark_parcel_paid`, `assign_rider`,
/// `set_delivery_status`) are all-or-nothing in every backend.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Insert `user` unless its email is taken; returns the existing user if so.
    async fn create_user_if_absent(&self, user: &User) -> Result<Option<User>, AppError>;
    async fn search_users_by_email(&self, prefix: &str, limit: u32)
        -> Result<Vec<User>, AppError>;
    async fn set_user_role(&self, user_id: &str, role: UserRole) -> Result<UpdateResult, AppError>;
    /// Set the role of the user with `email`, creating the user if needed.
    async fn upsert_user_role(
        &self,
        email: &str,
        role: UserRole,
        at: &str,
    ) -> Result<UpdateResult, AppError>;

    // Riders
    async fn get_rider(&self, rider_id: &str) -> Result<Option<Rider>, AppError>;
    async fn insert_rider(&self, rider: &Rider) -> Result<(), AppError>;
    async fn list_riders(&self, filter: &RiderFilter) -> Result<Vec<Rider>, AppError>;
    /// Returns the updated rider, or `None` if no rider has that id.
    async fn set_rider_status(
        &self,
        rider_id: &str,
        status: RiderStatus,
        at: &str,
    ) -> Result<Option<RiderStatusChange>, AppError>;

    // Parcels
    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>, AppError>;
    async fn insert_parcel(&self, parcel: &Parcel) -> Result<(), AppError>;
    /// Matching parcels, newest `created_at` first.
    async fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>, AppError>;
    async fn delete_parcel(&self, parcel_id: &str) -> Result<DeleteResult, AppError>;
    /// Flip an unpaid parcel to paid and append `record` atomically.
    ///
    /// `NotFound` if the parcel is missing, `BadRequest` if already paid.
    async fn mark_parcel_paid(&self, record: &PaymentRecord) -> Result<(), AppError>;
    /// Set the parcel's rider fields and mark the rider busy atomically.
    ///
    /// A previous rider of the parcel goes back to `Idle` unless it still
    /// holds another parcel in `rider_assign` or `in_transit`.
    async fn assign_rider(&self, assignment: &RiderAssignment)
        -> Result<AssignmentResult, AppError>;
    /// Move a parcel along the delivery state machine.
    ///
    /// Leaving `rider_assign`/`in_transit` (delivery or unassignment) returns
    /// the assigned rider to `Idle` once it holds no other active parcel.
    async fn set_delivery_status(
        &self,
        parcel_id: &str,
        status: DeliveryStatus,
        at: &str,
    ) -> Result<UpdateResult, AppError>;

    // Payment history
    /// Payment records, newest first, optionally for one user.
    async fn list_payments(&self, user_email: Option<&str>)
        -> Result<Vec<PaymentRecord>, AppError>;
}

/// Sort newest first by an RFC3339 timestamp key.
pub(crate) fn sort_newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|a, b| key(b).cmp(key(a)));
}

/// Reject an illegal delivery transition.
pub(crate) fn check_transition(
    from: DeliveryStatus,
    to: DeliveryStatus,
) -> Result<(), AppError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Cannot change delivery status from '{}' to '{}'.",
            from.as_str(),
            to.as_str()
        )))
    }
}
