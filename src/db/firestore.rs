// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (signup, roles)
//! - Riders (registration, status, work status)
//! - Parcels (shipment lifecycle)
//! - Payment history (append-only ledger keyed by parcel id)

use crate::db::{
    check_transition, collections, AssignmentResult, DeleteResult, ParcelFilter, RiderAssignment,
    RiderFilter, RiderStatusChange, Store, UpdateResult,
};
use crate::error::AppError;
use crate::models::id::new_id;
use crate::time_utils::now_rfc3339;
use crate::models::{
    DeliveryStatus, Parcel, PaymentRecord, PaymentStatus, Rider, RiderStatus, User, UserRole,
    WorkStatus,
};
use firestore::{
    paths, FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreTransaction,
    FirestoreWritePrecondition,
};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any token; skip real credentials there.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client.
    ///
    /// Every operation fails with `ServiceUnavailable`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("Database not connected (offline mode)".to_string())
        })
    }

    async fn get_by_id<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        read_doc(self.get_client()?, collection, id).await
    }

    /// Write only `fields` of `object` onto the document.
    async fn put<T>(
        &self,
        collection: &str,
        id: &str,
        fields: Vec<String>,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn create<T>(&self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

async fn read_doc<T>(
    db: &firestore::FirestoreDb,
    collection: &str,
    id: &str,
) -> Result<Option<T>, AppError>
where
    T: serde::de::DeserializeOwned + Send,
{
    db.fluent()
        .select()
        .by_id_in(collection)
        .obj()
        .one(id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

async fn begin_transaction(
    client: &firestore::FirestoreDb,
) -> Result<FirestoreTransaction<'_>, AppError> {
    client
        .begin_transaction()
        .await
        .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
}

/// A client whose reads go through `transaction`, so the commit fails if
/// anything read has changed since.
fn transaction_reader(
    client: &firestore::FirestoreDb,
    transaction: &FirestoreTransaction<'_>,
) -> firestore::FirestoreDb {
    client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
        transaction.transaction_id().clone(),
    ))
}

/// Commit on success, roll back on error.
async fn finish<T>(
    transaction: FirestoreTransaction<'_>,
    outcome: Result<T, AppError>,
) -> Result<T, AppError> {
    match outcome {
        Ok(value) => {
            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
            Ok(value)
        }
        Err(e) => {
            let _ = transaction.rollback().await;
            Err(e)
        }
    }
}

/// Rider id the parcel currently keeps busy, if any.
fn holds_rider(parcel: &Parcel) -> Option<&str> {
    if DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&parcel.delivery_status) {
        parcel.assigned_rider_id.as_deref()
    } else {
        None
    }
}

/// Whether the rider holds an active parcel other than `parcel_id`.
async fn holds_other_parcel(
    reader: &firestore::FirestoreDb,
    rider_id: &str,
    parcel_id: &str,
) -> Result<bool, AppError> {
    let rider_id = rider_id.to_string();
    let parcels: Vec<Parcel> = reader
        .fluent()
        .select()
        .from(collections::PARCELS)
        .filter(move |q| q.for_all([q.field("assigned_rider_id").eq(rider_id.clone())]))
        .obj()
        .query()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(parcels
        .iter()
        .any(|p| p.id != parcel_id && holds_rider(p).is_some()))
}

/// Queue a work-status write for `rider`.
fn write_work_status(
    client: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    rider: &Rider,
) -> Result<(), AppError> {
    client
        .fluent()
        .update()
        .fields(paths!(Rider::{work_status, updated_at}))
        .in_col(collections::RIDERS)
        .document_id(&rider.id)
        .object(rider)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add rider to transaction: {}", e)))?;
    Ok(())
}

/// Queue the release of `rider_id` from `parcel_id` unless it holds another
/// active parcel. Returns whether the rider goes idle.
async fn release_rider(
    client: &firestore::FirestoreDb,
    reader: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    rider_id: &str,
    parcel_id: &str,
    at: &str,
) -> Result<bool, AppError> {
    if holds_other_parcel(reader, rider_id, parcel_id).await? {
        return Ok(false);
    }
    let Some(mut rider) = read_doc::<Rider>(reader, collections::RIDERS, rider_id).await? else {
        return Ok(false);
    };
    if rider.work_status == WorkStatus::Idle {
        return Ok(false);
    }

    rider.work_status = WorkStatus::Idle;
    rider.updated_at = Some(at.to_string());
    write_work_status(client, transaction, &rider)?;
    Ok(true)
}

async fn mark_paid_in(
    client: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    record: &PaymentRecord,
) -> Result<(), AppError> {
    let reader = transaction_reader(client, transaction);

    let mut parcel: Parcel = read_doc(&reader, collections::PARCELS, &record.parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Parcel not found with the provided ID.".to_string()))?;

    if parcel.payment_status == PaymentStatus::Paid {
        return Err(AppError::BadRequest(
            "Parcel is already marked as paid.".to_string(),
        ));
    }

    parcel.payment_status = PaymentStatus::Paid;
    parcel.payment_time = Some(record.payment_time.clone());

    client
        .fluent()
        .update()
        .fields(paths!(Parcel::{payment_status, payment_time}))
        .in_col(collections::PARCELS)
        .document_id(&parcel.id)
        .object(&parcel)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add parcel to transaction: {}", e)))?;

    // The ledger entry must not exist yet; a concurrent payment for the
    // same parcel makes this commit fail instead of writing twice.
    client
        .fluent()
        .update()
        .in_col(collections::PAYMENT_HISTORY)
        .precondition(FirestoreWritePrecondition::Exists(false))
        .document_id(&record.id)
        .object(record)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add payment to transaction: {}", e)))?;

    Ok(())
}

async fn assign_in(
    client: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    assignment: &RiderAssignment,
) -> Result<AssignmentResult, AppError> {
    let reader = transaction_reader(client, transaction);

    let mut parcel: Parcel = read_doc(&reader, collections::PARCELS, &assignment.parcel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Parcel not found.".to_string()))?;
    let mut rider: Rider = read_doc(&reader, collections::RIDERS, &assignment.rider_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Rider not found.".to_string()))?;

    check_transition(parcel.delivery_status, assignment.delivery_status)?;

    if let Some(previous) = holds_rider(&parcel).filter(|old| *old != rider.id) {
        let previous = previous.to_string();
        let released = release_rider(
            client,
            &reader,
            transaction,
            &previous,
            &parcel.id,
            &assignment.at,
        )
        .await?;
        tracing::debug!(rider_id = %previous, released, "Previous rider unassigned");
    }

    let busy = DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&assignment.delivery_status)
        || holds_other_parcel(&reader, &rider.id, &parcel.id).await?;
    let work_status = if busy {
        WorkStatus::InDelivery
    } else {
        WorkStatus::Idle
    };
    let rider_modified = rider.work_status != work_status;
    rider.work_status = work_status;
    rider.updated_at = Some(assignment.at.clone());

    parcel.delivery_status = assignment.delivery_status;
    parcel.assigned_rider_id = Some(rider.id.clone());
    parcel.assigned_rider_name = Some(rider.name.clone());
    parcel.assign_rider_email = Some(rider.email.clone());
    parcel.updated_at = Some(assignment.at.clone());

    client
        .fluent()
        .update()
        .fields(paths!(Parcel::{
            delivery_status,
            assigned_rider_id,
            assigned_rider_name,
            assign_rider_email,
            updated_at
        }))
        .in_col(collections::PARCELS)
        .document_id(&parcel.id)
        .object(&parcel)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add parcel to transaction: {}", e)))?;

    write_work_status(client, transaction, &rider)?;

    Ok(AssignmentResult {
        parcel: UpdateResult::matched(true),
        rider: UpdateResult::matched(rider_modified),
    })
}

async fn set_delivery_status_in(
    client: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    parcel_id: &str,
    status: DeliveryStatus,
    at: &str,
) -> Result<(UpdateResult, bool), AppError> {
    let reader = transaction_reader(client, transaction);

    let Some(mut parcel) = read_doc::<Parcel>(&reader, collections::PARCELS, parcel_id).await?
    else {
        return Ok((UpdateResult::unmatched(), false));
    };

    check_transition(parcel.delivery_status, status)?;
    let modified = parcel.delivery_status != status;

    let released = match holds_rider(&parcel) {
        Some(rider_id) if !DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&status) => {
            let rider_id = rider_id.to_string();
            release_rider(client, &reader, transaction, &rider_id, parcel_id, at).await?
        }
        _ => false,
    };

    parcel.delivery_status = status;
    parcel.updated_at = Some(at.to_string());

    client
        .fluent()
        .update()
        .fields(paths!(Parcel::{delivery_status, updated_at}))
        .in_col(collections::PARCELS)
        .document_id(&parcel.id)
        .object(&parcel)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add parcel to transaction: {}", e)))?;

    Ok((UpdateResult::matched(modified), released))
}

async fn delete_in(
    client: &firestore::FirestoreDb,
    transaction: &mut FirestoreTransaction<'_>,
    parcel_id: &str,
    at: &str,
) -> Result<bool, AppError> {
    let reader = transaction_reader(client, transaction);

    let Some(parcel) = read_doc::<Parcel>(&reader, collections::PARCELS, parcel_id).await? else {
        return Ok(false);
    };

    if let Some(rider_id) = holds_rider(&parcel) {
        let rider_id = rider_id.to_string();
        release_rider(client, &reader, transaction, &rider_id, parcel_id, at).await?;
    }

    client
        .fluent()
        .delete()
        .from(collections::PARCELS)
        .document_id(parcel_id)
        .add_to_transaction(transaction)
        .map_err(|e| AppError::Database(format!("Failed to add delete to transaction: {}", e)))?;

    Ok(true)
}

#[async_trait::async_trait]
impl Store for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_string();
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn create_user_if_absent(&self, user: &User) -> Result<Option<User>, AppError> {
        if let Some(existing) = self.find_user_by_email(&user.email).await? {
            return Ok(Some(existing));
        }

        self.create(collections::USERS, &user.id, user).await?;
        tracing::info!(user_id = %user.id, "User created");
        Ok(None)
    }

    async fn search_users_by_email(
        &self,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<User>, AppError> {
        let lower = prefix.to_string();
        // '\u{f8ff}' sorts after every character used in email addresses.
        let upper = format!("{prefix}\u{f8ff}");

        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.for_all([
                    q.field("email").greater_than_or_equal(lower.clone()),
                    q.field("email").less_than(upper.clone()),
                ])
            })
            .order_by([("email", FirestoreQueryDirection::Ascending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_user_role(&self, user_id: &str, role: UserRole) -> Result<UpdateResult, AppError> {
        let Some(mut user) = self.get_by_id::<User>(collections::USERS, user_id).await? else {
            return Ok(UpdateResult::unmatched());
        };

        let modified = user.role != role;
        if modified {
            user.role = role;
            self.put(collections::USERS, &user.id, paths!(User::{role}), &user)
                .await?;
        }

        Ok(UpdateResult::matched(modified))
    }

    async fn upsert_user_role(
        &self,
        email: &str,
        role: UserRole,
        at: &str,
    ) -> Result<UpdateResult, AppError> {
        match self.find_user_by_email(email).await? {
            Some(mut user) => {
                let modified = user.role != role;
                if modified {
                    user.role = role;
                    self.put(collections::USERS, &user.id, paths!(User::{role}), &user)
                        .await?;
                }
                Ok(UpdateResult::matched(modified))
            }
            None => {
                let user = User {
                    id: new_id()?,
                    email: email.to_string(),
                    name: None,
                    photo_url: None,
                    role,
                    created_at: at.to_string(),
                };
                self.create(collections::USERS, &user.id, &user).await?;
                Ok(UpdateResult::upserted(user.id))
            }
        }
    }

    // ─── Rider Operations ────────────────────────────────────────

    async fn get_rider(&self, rider_id: &str) -> Result<Option<Rider>, AppError> {
        self.get_by_id(collections::RIDERS, rider_id).await
    }

    async fn insert_rider(&self, rider: &Rider) -> Result<(), AppError> {
        self.create(collections::RIDERS, &rider.id, rider).await
    }

    async fn list_riders(&self, filter: &RiderFilter) -> Result<Vec<Rider>, AppError> {
        let filter = filter.clone();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::RIDERS)
            .filter(move |q| {
                q.for_all([
                    filter
                        .status
                        .and_then(|s| q.field("status").eq(s.as_str())),
                    filter
                        .warehouse
                        .as_ref()
                        .and_then(|w| q.field("warehouse").eq(w.clone())),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_rider_status(
        &self,
        rider_id: &str,
        status: RiderStatus,
        at: &str,
    ) -> Result<Option<RiderStatusChange>, AppError> {
        let Some(mut rider) = self.get_rider(rider_id).await? else {
            return Ok(None);
        };

        let modified = rider.status != status;
        if modified {
            rider.status = status;
            rider.updated_at = Some(at.to_string());
            self.put(
                collections::RIDERS,
                &rider.id,
                paths!(Rider::{status, updated_at}),
                &rider,
            )
            .await?;
        }

        Ok(Some(RiderStatusChange { rider, modified }))
    }

    // ─── Parcel Operations ───────────────────────────────────────

    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>, AppError> {
        self.get_by_id(collections::PARCELS, parcel_id).await
    }

    async fn insert_parcel(&self, parcel: &Parcel) -> Result<(), AppError> {
        self.create(collections::PARCELS, &parcel.id, parcel).await
    }

    async fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>, AppError> {
        let query_filter = filter.clone();
        let parcels: Vec<Parcel> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PARCELS)
            .filter(move |q| {
                let f = &query_filter;
                q.for_all([
                    f.id.as_ref().and_then(|v| q.field("id").eq(v.clone())),
                    f.created_by
                        .as_ref()
                        .and_then(|v| q.field("created_by").eq(v.clone())),
                    f.payment_status
                        .and_then(|v| q.field("payment_status").eq(v.as_str())),
                    f.delivery_status
                        .and_then(|v| q.field("delivery_status").eq(v.as_str())),
                    f.assign_rider_email
                        .as_ref()
                        .and_then(|v| q.field("assign_rider_email").eq(v.clone())),
                ])
            })
            .order_by([("created_at", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // `delivery_status_in` is not pushed into the query.
        Ok(parcels.into_iter().filter(|p| filter.matches(p)).collect())
    }

    async fn delete_parcel(&self, parcel_id: &str) -> Result<DeleteResult, AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;
        let outcome = delete_in(client, &mut transaction, parcel_id, &now_rfc3339()).await;
        let existed = finish(transaction, outcome).await?;

        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: u32::from(existed),
        })
    }

    async fn mark_parcel_paid(&self, record: &PaymentRecord) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;
        let outcome = mark_paid_in(client, &mut transaction, record).await;
        finish(transaction, outcome).await?;

        tracing::info!(
            parcel_id = %record.parcel_id,
            amount = record.amount,
            "Parcel payment recorded atomically"
        );

        Ok(())
    }

    async fn assign_rider(
        &self,
        assignment: &RiderAssignment,
    ) -> Result<AssignmentResult, AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;
        let outcome = assign_in(client, &mut transaction, assignment).await;
        let result = finish(transaction, outcome).await?;

        tracing::info!(
            parcel_id = %assignment.parcel_id,
            rider_id = %assignment.rider_id,
            delivery_status = assignment.delivery_status.as_str(),
            "Rider assigned atomically"
        );

        Ok(result)
    }

    async fn set_delivery_status(
        &self,
        parcel_id: &str,
        status: DeliveryStatus,
        at: &str,
    ) -> Result<UpdateResult, AppError> {
        let client = self.get_client()?;
        let mut transaction = begin_transaction(client).await?;
        let outcome = set_delivery_status_in(client, &mut transaction, parcel_id, status, at).await;
        let (result, rider_released) = finish(transaction, outcome).await?;

        tracing::debug!(
            parcel_id,
            delivery_status = status.as_str(),
            rider_released,
            "Delivery status updated"
        );

        Ok(result)
    }

    // ─── Payment History Operations ──────────────────────────────

    async fn list_payments(
        &self,
        user_email: Option<&str>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let user_email = user_email.map(str::to_string);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PAYMENT_HISTORY)
            .filter(move |q| {
                q.for_all([user_email
                    .as_ref()
                    .and_then(|email| q.field("user_email").eq(email.clone()))])
            })
            .order_by([("payment_time", FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
