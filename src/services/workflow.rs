// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parcel lifecycle and the side effects each transition has on riders,
//! payment history and user roles.
//!
//! Every id coming from a client is format-checked here before the store is
//! touched.

use crate::db::{
    AssignmentResult, DeleteResult, ParcelFilter, RiderAssignment, Store, UpdateResult,
};
use crate::error::AppError;
use crate::models::id::{ensure_valid_id, new_id};
use crate::models::{
    DeliveryStatus, Parcel, PaymentRecord, PaymentStatus, Rider, RiderStatus, User, UserRole,
    WorkStatus,
};
use crate::time_utils::now_rfc3339;
use serde::Deserialize;
use validator::Validate;

/// Maximum number of users returned by an email prefix search.
pub const USER_SEARCH_LIMIT: u32 = 10;

// ─── Users ───────────────────────────────────────────────────────

/// Signup payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Signup {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Create the user unless one with the same email exists.
///
/// Returns the new user's id, or `None` if the email was already taken.
pub async fn signup(db: &dyn Store, signup: Signup) -> Result<Option<String>, AppError> {
    signup.validate()?;

    let user = User {
        id: new_id()?,
        email: signup.email,
        name: signup.name,
        photo_url: signup.photo_url,
        role: UserRole::User,
        created_at: now_rfc3339(),
    };

    match db.create_user_if_absent(&user).await? {
        Some(existing) => {
            tracing::debug!(user_id = %existing.id, "Signup for existing user");
            Ok(None)
        }
        None => Ok(Some(user.id)),
    }
}

/// Role stored for `email`, or `None` if no such user.
pub async fn role_of(db: &dyn Store, email: &str) -> Result<Option<UserRole>, AppError> {
    Ok(db.find_user_by_email(email).await?.map(|u| u.role))
}

pub async fn search_users(db: &dyn Store, prefix: &str) -> Result<Vec<User>, AppError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(AppError::BadRequest(
            "Email query parameter is required.".to_string(),
        ));
    }
    db.search_users_by_email(prefix, USER_SEARCH_LIMIT).await
}

pub async fn set_user_role(
    db: &dyn Store,
    user_id: &str,
    role: UserRole,
) -> Result<UpdateResult, AppError> {
    let user_id = ensure_valid_id(user_id, "User")?;
    let result = db.set_user_role(&user_id, role).await?;
    tracing::info!(%user_id, role = role.as_str(), matched = result.matched_count, "User role set");
    Ok(result)
}

// ─── Riders ──────────────────────────────────────────────────────

/// Rider registration payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RiderApplication {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
}

/// Register a rider as `pending` / `idle`; returns the new rider id.
pub async fn register_rider(
    db: &dyn Store,
    application: RiderApplication,
) -> Result<String, AppError> {
    application.validate()?;

    let rider = Rider {
        id: new_id()?,
        name: application.name,
        email: application.email,
        phone: application.phone,
        region: application.region,
        warehouse: application.warehouse,
        status: RiderStatus::Pending,
        work_status: WorkStatus::Idle,
        created_at: now_rfc3339(),
        updated_at: None,
    };

    db.insert_rider(&rider).await?;
    tracing::info!(rider_id = %rider.id, "Rider registered");
    Ok(rider.id)
}

/// Set a rider's status. Activation promotes the user with the rider's
/// email to `rider`, creating that user if needed.
pub async fn set_rider_status(
    db: &dyn Store,
    rider_id: &str,
    status: RiderStatus,
) -> Result<UpdateResult, AppError> {
    let rider_id = ensure_valid_id(rider_id, "Rider")?;
    let now = now_rfc3339();

    let Some(change) = db.set_rider_status(&rider_id, status, &now).await? else {
        return Ok(UpdateResult::unmatched());
    };

    if status == RiderStatus::Active {
        let promoted = db
            .upsert_user_role(&change.rider.email, UserRole::Rider, &now)
            .await?;
        tracing::info!(
            %rider_id,
            upserted = promoted.upserted_id.is_some(),
            "Rider activated; user promoted to rider"
        );
    }

    Ok(UpdateResult::matched(change.modified))
}

// ─── Parcels ─────────────────────────────────────────────────────

/// Parcel creation payload. Workflow fields are always set by the server.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ParcelDraft {
    #[validate(email)]
    pub created_by: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub parcel_type: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub weight_kg: Option<f64>,
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
}

/// Create an `unpaid` / `pending` parcel; returns the new parcel id.
pub async fn create_parcel(db: &dyn Store, draft: ParcelDraft) -> Result<String, AppError> {
    draft.validate()?;

    let parcel = Parcel {
        id: new_id()?,
        created_by: draft.created_by,
        title: draft.title,
        parcel_type: draft.parcel_type,
        weight_kg: draft.weight_kg,
        cost: draft.cost,
        sender_name: draft.sender_name,
        sender_address: draft.sender_address,
        sender_region: draft.sender_region,
        receiver_name: draft.receiver_name,
        receiver_address: draft.receiver_address,
        receiver_region: draft.receiver_region,
        payment_status: PaymentStatus::Unpaid,
        delivery_status: DeliveryStatus::Pending,
        assigned_rider_id: None,
        assigned_rider_name: None,
        assign_rider_email: None,
        created_at: now_rfc3339(),
        payment_time: None,
        updated_at: None,
    };

    db.insert_parcel(&parcel).await?;
    tracing::info!(parcel_id = %parcel.id, "Parcel created");
    Ok(parcel.id)
}

/// Parcels by creator and/or id, newest first.
pub async fn find_parcels(
    db: &dyn Store,
    created_by: Option<String>,
    parcel_id: Option<String>,
) -> Result<Vec<Parcel>, AppError> {
    let parcel_id = parcel_id
        .map(|id| ensure_valid_id(&id, "Parcel"))
        .transpose()?;

    db.list_parcels(&ParcelFilter {
        id: parcel_id,
        created_by,
        ..Default::default()
    })
    .await
}

/// Completed payment reported by the client.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub parcel_id: String,
    #[validate(email)]
    pub email: String,
    pub amount: u64,
    #[validate(length(min = 1))]
    pub transaction_id: String,
    #[validate(length(min = 1))]
    pub payment_method: String,
}

/// Mark a parcel paid and record the payment; returns the record id.
pub async fn mark_paid(
    db: &dyn Store,
    confirmation: PaymentConfirmation,
) -> Result<String, AppError> {
    let parcel_id = ensure_valid_id(&confirmation.parcel_id, "Parcel")?;
    confirmation.validate()?;

    let record = PaymentRecord {
        id: parcel_id.clone(),
        parcel_id,
        user_email: confirmation.email,
        amount: confirmation.amount,
        transaction_id: confirmation.transaction_id,
        payment_method: confirmation.payment_method,
        payment_time: now_rfc3339(),
    };

    db.mark_parcel_paid(&record).await?;
    Ok(record.id)
}

/// Assign `rider_id` to `parcel_id`, marking the rider busy.
pub async fn assign_rider(
    db: &dyn Store,
    parcel_id: &str,
    rider_id: &str,
    delivery_status: DeliveryStatus,
) -> Result<AssignmentResult, AppError> {
    let parcel_id = ensure_valid_id(parcel_id, "Parcel")?;
    let rider_id = ensure_valid_id(rider_id, "Rider")?;

    db.assign_rider(&RiderAssignment {
        parcel_id,
        rider_id,
        delivery_status,
        at: now_rfc3339(),
    })
    .await
}

pub async fn update_delivery_status(
    db: &dyn Store,
    parcel_id: &str,
    status: DeliveryStatus,
) -> Result<UpdateResult, AppError> {
    let parcel_id = ensure_valid_id(parcel_id, "Parcel")?;
    db.set_delivery_status(&parcel_id, status, &now_rfc3339())
        .await
}

pub async fn delete_parcel(db: &dyn Store, parcel_id: &str) -> Result<DeleteResult, AppError> {
    let parcel_id = ensure_valid_id(parcel_id, "Parcel")?;
    let result = db.delete_parcel(&parcel_id).await?;
    tracing::info!(%parcel_id, deleted = result.deleted_count, "Parcel deleted");
    Ok(result)
}

/// Parcels a rider currently holds (`rider_assign` or `in_transit`), newest
/// first. `NotFound` if the rider is unknown or holds nothing.
pub async fn active_assignments(db: &dyn Store, rider_id: &str) -> Result<Vec<Parcel>, AppError> {
    let rider_id = ensure_valid_id(rider_id, "Rider")?;

    let rider = db
        .get_rider(&rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Rider not found.".to_string()))?;

    let parcels = db
        .list_parcels(&ParcelFilter {
            assign_rider_email: Some(rider.email),
            delivery_status_in: Some(DeliveryStatus::ACTIVE_ASSIGNMENT.to_vec()),
            ..Default::default()
        })
        .await?;

    if parcels.is_empty() {
        return Err(AppError::NotFound(
            "No assigned parcels found for this rider.".to_string(),
        ));
    }

    Ok(parcels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    fn draft(created_by: &str) -> ParcelDraft {
        ParcelDraft {
            created_by: created_by.to_string(),
            title: Some("Laptop".to_string()),
            parcel_type: Some("non-document".to_string()),
            weight_kg: Some(2.0),
            cost: Some(2500),
            sender_name: None,
            sender_address: None,
            sender_region: Some("Dhaka".to_string()),
            receiver_name: None,
            receiver_address: None,
            receiver_region: Some("Khulna".to_string()),
        }
    }

    fn application(email: &str) -> RiderApplication {
        RiderApplication {
            name: "Rafi".to_string(),
            email: email.to_string(),
            phone: None,
            region: None,
            warehouse: Some("central".to_string()),
        }
    }

    #[tokio::test]
    async fn test_signup_is_idempotent() {
        let db = MemoryDb::new();
        let signup = Signup {
            email: "ana@example.com".to_string(),
            name: None,
            photo_url: None,
        };

        assert!(signup_once(&db, &signup).await.is_some());
        assert!(signup_once(&db, &signup).await.is_none());
        assert_eq!(
            db.search_users_by_email("ana", 10).await.unwrap().len(),
            1
        );
    }

    async fn signup_once(db: &MemoryDb, signup: &Signup) -> Option<String> {
        super::signup(db, signup.clone()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_parcel_rejects_bad_creator_email() {
        let db = MemoryDb::new();
        let err = create_parcel(&db, draft("not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_activation_promotes_user_other_statuses_do_not() {
        let db = MemoryDb::new();
        let offline = register_rider(&db, application("off@example.com"))
            .await
            .unwrap();
        let active = register_rider(&db, application("on@example.com"))
            .await
            .unwrap();

        set_rider_status(&db, &offline, RiderStatus::Offline)
            .await
            .unwrap();
        set_rider_status(&db, &active, RiderStatus::Active)
            .await
            .unwrap();

        assert_eq!(role_of(&db, "off@example.com").await.unwrap(), None);
        assert_eq!(
            role_of(&db, "on@example.com").await.unwrap(),
            Some(UserRole::Rider)
        );
    }

    #[tokio::test]
    async fn test_unknown_rider_status_update_matches_nothing() {
        let db = MemoryDb::new();
        let result = set_rider_status(&db, "0123456789abcdef01234567", RiderStatus::Active)
            .await
            .unwrap();
        assert_eq!(result.matched_count, 0);
        assert_eq!(role_of(&db, "anyone@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_repeated_rider_status_reports_no_modification() {
        let db = MemoryDb::new();
        let rider_id = register_rider(&db, application("rider@example.com"))
            .await
            .unwrap();

        let first = set_rider_status(&db, &rider_id, RiderStatus::Active)
            .await
            .unwrap();
        assert_eq!(first.modified_count, 1);

        let again = set_rider_status(&db, &rider_id, RiderStatus::Active)
            .await
            .unwrap();
        assert_eq!(again.matched_count, 1);
        assert_eq!(again.modified_count, 0);
    }

    #[tokio::test]
    async fn test_uppercase_ids_reach_stored_documents() {
        let db = MemoryDb::new();
        let parcel_id = create_parcel(&db, draft("shipper@example.com"))
            .await
            .unwrap();
        let upper = parcel_id.to_ascii_uppercase();

        let found = find_parcels(&db, None, Some(upper.clone())).await.unwrap();
        assert_eq!(found.len(), 1);

        let record_id = mark_paid(
            &db,
            PaymentConfirmation {
                parcel_id: upper.clone(),
                email: "shipper@example.com".to_string(),
                amount: 2500,
                transaction_id: "pi_upper".to_string(),
                payment_method: "card".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(record_id, parcel_id);

        let deleted = delete_parcel(&db, &upper).await.unwrap();
        assert_eq!(deleted.deleted_count, 1);
    }

    #[tokio::test]
    async fn test_active_assignments_follow_delivery_progress() {
        let db = MemoryDb::new();
        let parcel_id = create_parcel(&db, draft("shipper@example.com"))
            .await
            .unwrap();
        let rider_id = register_rider(&db, application("rider@example.com"))
            .await
            .unwrap();

        assert!(matches!(
            active_assignments(&db, &rider_id).await,
            Err(AppError::NotFound(_))
        ));

        assign_rider(&db, &parcel_id, &rider_id, DeliveryStatus::RiderAssign)
            .await
            .unwrap();
        assert_eq!(active_assignments(&db, &rider_id).await.unwrap().len(), 1);

        update_delivery_status(&db, &parcel_id, DeliveryStatus::InTransit)
            .await
            .unwrap();
        assert_eq!(active_assignments(&db, &rider_id).await.unwrap().len(), 1);

        update_delivery_status(&db, &parcel_id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        assert!(active_assignments(&db, &rider_id).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_paid_rejects_malformed_id() {
        let db = MemoryDb::new();
        let err = mark_paid(
            &db,
            PaymentConfirmation {
                parcel_id: "abc".to_string(),
                email: "ana@example.com".to_string(),
                amount: 100,
                transaction_id: "pi_1".to_string(),
                payment_method: "card".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid Parcel ID format."));
    }
}
