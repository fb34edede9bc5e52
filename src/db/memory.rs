// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local store for development and tests.
//!
//! Multi-document operations take the parcel entry first, then the rider,
//! then the rider's load, then the payment ledger, so two writers can never
//! deadlock. At most one rider entry is held at a time.

use crate::db::{
    check_transition, sort_newest_first, AssignmentResult, DeleteResult, ParcelFilter,
    RiderAssignment, RiderFilter, RiderStatusChange, Store, UpdateResult,
};
use crate::error::AppError;
use crate::models::id::new_id;
use crate::models::{
    DeliveryStatus, Parcel, PaymentRecord, PaymentStatus, Rider, RiderStatus, User, UserRole,
    WorkStatus,
};
use crate::time_utils::now_rfc3339;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    /// email -> user id
    user_emails: DashMap<String, String>,
    riders: DashMap<String, Rider>,
    parcels: DashMap<String, Parcel>,
    /// rider id -> ids of parcels it holds in an active assignment
    rider_loads: DashMap<String, HashSet<String>>,
    payments: DashMap<String, PaymentRecord>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `parcel_id` occupies `rider_id` and mark the rider busy.
    /// `None` if the rider is unknown.
    fn occupy(&self, rider_id: &str, parcel_id: &str, at: &str) -> Option<Rider> {
        let mut rider = self.riders.get_mut(rider_id)?;
        self.rider_loads
            .entry(rider_id.to_string())
            .or_default()
            .insert(parcel_id.to_string());
        rider.work_status = WorkStatus::InDelivery;
        rider.updated_at = Some(at.to_string());
        Some(rider.clone())
    }

    /// Drop `parcel_id` from the rider's load; the rider goes idle once it
    /// holds nothing else.
    fn release(&self, rider_id: &str, parcel_id: &str, at: &str) -> bool {
        let Some(mut rider) = self.riders.get_mut(rider_id) else {
            return false;
        };
        let mut load = self.rider_loads.entry(rider_id.to_string()).or_default();
        load.remove(parcel_id);
        if !load.is_empty() || rider.work_status == WorkStatus::Idle {
            return false;
        }
        rider.work_status = WorkStatus::Idle;
        rider.updated_at = Some(at.to_string());
        true
    }
}

fn holds_rider(parcel: &Parcel) -> Option<&str> {
    if DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&parcel.delivery_status) {
        parcel.assigned_rider_id.as_deref()
    } else {
        None
    }
}

#[async_trait::async_trait]
impl Store for MemoryDb {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.user_emails.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn create_user_if_absent(&self, user: &User) -> Result<Option<User>, AppError> {
        match self.user_emails.entry(user.email.clone()) {
            Entry::Occupied(existing) => Ok(self.users.get(existing.get()).map(|u| u.clone())),
            Entry::Vacant(slot) => {
                self.users.insert(user.id.clone(), user.clone());
                slot.insert(user.id.clone());
                Ok(None)
            }
        }
    }

    async fn search_users_by_email(
        &self,
        prefix: &str,
        limit: u32,
    ) -> Result<Vec<User>, AppError> {
        let mut found: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.email.starts_with(prefix))
            .map(|u| u.clone())
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn set_user_role(&self, user_id: &str, role: UserRole) -> Result<UpdateResult, AppError> {
        let Some(mut user) = self.users.get_mut(user_id) else {
            return Ok(UpdateResult::unmatched());
        };
        let modified = user.role != role;
        user.role = role;
        Ok(UpdateResult::matched(modified))
    }

    async fn upsert_user_role(
        &self,
        email: &str,
        role: UserRole,
        at: &str,
    ) -> Result<UpdateResult, AppError> {
        match self.user_emails.entry(email.to_string()) {
            Entry::Occupied(existing) => {
                let Some(mut user) = self.users.get_mut(existing.get()) else {
                    return Ok(UpdateResult::unmatched());
                };
                let modified = user.role != role;
                user.role = role;
                Ok(UpdateResult::matched(modified))
            }
            Entry::Vacant(slot) => {
                let user = User {
                    id: new_id()?,
                    email: email.to_string(),
                    name: None,
                    photo_url: None,
                    role,
                    created_at: at.to_string(),
                };
                let id = user.id.clone();
                self.users.insert(id.clone(), user);
                slot.insert(id.clone());
                Ok(UpdateResult::upserted(id))
            }
        }
    }

    async fn get_rider(&self, rider_id: &str) -> Result<Option<Rider>, AppError> {
        Ok(self.riders.get(rider_id).map(|r| r.clone()))
    }

    async fn insert_rider(&self, rider: &Rider) -> Result<(), AppError> {
        match self.riders.entry(rider.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Database(format!(
                "Rider {} already exists",
                rider.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(rider.clone());
                Ok(())
            }
        }
    }

    async fn list_riders(&self, filter: &RiderFilter) -> Result<Vec<Rider>, AppError> {
        let mut riders: Vec<Rider> = self
            .riders
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| r.clone())
            .collect();
        sort_newest_first(&mut riders, |r| r.created_at.as_str());
        Ok(riders)
    }

    async fn set_rider_status(
        &self,
        rider_id: &str,
        status: RiderStatus,
        at: &str,
    ) -> Result<Option<RiderStatusChange>, AppError> {
        let Some(mut rider) = self.riders.get_mut(rider_id) else {
            return Ok(None);
        };
        let modified = rider.status != status;
        if modified {
            rider.status = status;
            rider.updated_at = Some(at.to_string());
        }
        Ok(Some(RiderStatusChange {
            rider: rider.clone(),
            modified,
        }))
    }

    async fn get_parcel(&self, parcel_id: &str) -> Result<Option<Parcel>, AppError> {
        Ok(self.parcels.get(parcel_id).map(|p| p.clone()))
    }

    async fn insert_parcel(&self, parcel: &Parcel) -> Result<(), AppError> {
        match self.parcels.entry(parcel.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Database(format!(
                "Parcel {} already exists",
                parcel.id
            ))),
            Entry::Vacant(slot) => {
                let slot = slot.insert(parcel.clone());
                if let Some(rider_id) = holds_rider(&slot) {
                    self.occupy(rider_id, &slot.id, &slot.created_at);
                }
                Ok(())
            }
        }
    }

    async fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>, AppError> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .iter()
            .filter(|p| filter.matches(p))
            .map(|p| p.clone())
            .collect();
        sort_newest_first(&mut parcels, |p| p.created_at.as_str());
        Ok(parcels)
    }

    async fn delete_parcel(&self, parcel_id: &str) -> Result<DeleteResult, AppError> {
        let removed = self.parcels.remove(parcel_id).map(|(_, parcel)| parcel);
        if let Some(parcel) = &removed {
            if let Some(rider_id) = holds_rider(parcel) {
                self.release(rider_id, &parcel.id, &now_rfc3339());
            }
        }
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: u32::from(removed.is_some()),
        })
    }

    async fn mark_parcel_paid(&self, record: &PaymentRecord) -> Result<(), AppError> {
        let mut parcel = self.parcels.get_mut(&record.parcel_id).ok_or_else(|| {
            AppError::NotFound("Parcel not found with the provided ID.".to_string())
        })?;

        if parcel.payment_status == PaymentStatus::Paid {
            return Err(AppError::BadRequest(
                "Parcel is already marked as paid.".to_string(),
            ));
        }

        match self.payments.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(AppError::BadRequest(
                "Parcel is already marked as paid.".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                parcel.payment_status = PaymentStatus::Paid;
                parcel.payment_time = Some(record.payment_time.clone());
                Ok(())
            }
        }
    }

    async fn assign_rider(
        &self,
        assignment: &RiderAssignment,
    ) -> Result<AssignmentResult, AppError> {
        let mut parcel = self
            .parcels
            .get_mut(&assignment.parcel_id)
            .ok_or_else(|| AppError::NotFound("Parcel not found.".to_string()))?;

        check_transition(parcel.delivery_status, assignment.delivery_status)?;

        let previous = holds_rider(&parcel).map(str::to_string);
        let before = self
            .riders
            .get(&assignment.rider_id)
            .ok_or_else(|| AppError::NotFound("Rider not found.".to_string()))?
            .work_status;

        let mut rider = self
            .occupy(&assignment.rider_id, &parcel.id, &assignment.at)
            .ok_or_else(|| AppError::NotFound("Rider not found.".to_string()))?;
        if !DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&assignment.delivery_status)
            && self.release(&rider.id, &parcel.id, &assignment.at)
        {
            rider.work_status = WorkStatus::Idle;
        }

        if let Some(old) = previous.filter(|old| *old != rider.id) {
            let released = self.release(&old, &parcel.id, &assignment.at);
            tracing::debug!(rider_id = %old, released, "Previous rider unassigned");
        }

        parcel.delivery_status = assignment.delivery_status;
        parcel.assigned_rider_id = Some(rider.id.clone());
        parcel.assigned_rider_name = Some(rider.name.clone());
        parcel.assign_rider_email = Some(rider.email.clone());
        parcel.updated_at = Some(assignment.at.clone());

        Ok(AssignmentResult {
            parcel: UpdateResult::matched(true),
            rider: UpdateResult::matched(rider.work_status != before),
        })
    }

    async fn set_delivery_status(
        &self,
        parcel_id: &str,
        status: DeliveryStatus,
        at: &str,
    ) -> Result<UpdateResult, AppError> {
        let Some(mut parcel) = self.parcels.get_mut(parcel_id) else {
            return Ok(UpdateResult::unmatched());
        };

        check_transition(parcel.delivery_status, status)?;
        let modified = parcel.delivery_status != status;

        if !DeliveryStatus::ACTIVE_ASSIGNMENT.contains(&status) {
            if let Some(rider_id) = holds_rider(&parcel) {
                self.release(rider_id, parcel_id, at);
            }
        }

        parcel.delivery_status = status;
        parcel.updated_at = Some(at.to_string());

        Ok(UpdateResult::matched(modified))
    }

    async fn list_payments(
        &self,
        user_email: Option<&str>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let mut records: Vec<PaymentRecord> = self
            .payments
            .iter()
            .filter(|r| user_email.is_none_or(|email| r.user_email == email))
            .map(|r| r.clone())
            .collect();
        sort_newest_first(&mut records, |r| r.payment_time.as_str());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parcel(id: &str, created_at: &str) -> Parcel {
        Parcel {
            id: id.to_string(),
            created_by: "shipper@example.com".to_string(),
            title: Some("Books".to_string()),
            parcel_type: Some("document".to_string()),
            weight_kg: Some(1.5),
            cost: Some(1200),
            sender_name: None,
            sender_address: None,
            sender_region: None,
            receiver_name: None,
            receiver_address: None,
            receiver_region: None,
            payment_status: PaymentStatus::Unpaid,
            delivery_status: DeliveryStatus::Pending,
            assigned_rider_id: None,
            assigned_rider_name: None,
            assign_rider_email: None,
            created_at: created_at.to_string(),
            payment_time: None,
            updated_at: None,
        }
    }

    fn rider(id: &str) -> Rider {
        Rider {
            id: id.to_string(),
            name: "Rita".to_string(),
            email: "rita@example.com".to_string(),
            phone: None,
            region: None,
            warehouse: Some("north".to_string()),
            status: RiderStatus::Active,
            work_status: WorkStatus::Idle,
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            updated_at: None,
        }
    }

    fn payment(parcel_id: &str) -> PaymentRecord {
        PaymentRecord {
            id: parcel_id.to_string(),
            parcel_id: parcel_id.to_string(),
            user_email: "shipper@example.com".to_string(),
            amount: 1200,
            transaction_id: "pi_123".to_string(),
            payment_method: "card".to_string(),
            payment_time: "2026-01-02T00:00:00.000000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_parcels_listed_newest_first() {
        let db = MemoryDb::new();
        db.insert_parcel(&parcel("a", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        db.insert_parcel(&parcel("b", "2026-01-03T00:00:00.000000Z"))
            .await
            .unwrap();
        db.insert_parcel(&parcel("c", "2026-01-02T00:00:00.000000Z"))
            .await
            .unwrap();

        let ids: Vec<String> = db
            .list_parcels(&ParcelFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_create_user_if_absent_is_unique_by_email() {
        let db = MemoryDb::new();
        let user = User {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            name: None,
            photo_url: None,
            role: UserRole::User,
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
        };
        assert!(db.create_user_if_absent(&user).await.unwrap().is_none());

        let dup = User {
            id: "u2".to_string(),
            ..user.clone()
        };
        let existing = db.create_user_if_absent(&dup).await.unwrap().unwrap();
        assert_eq!(existing.id, "u1");
        assert_eq!(db.search_users_by_email("a@", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_paid_twice_fails_and_writes_one_record() {
        let db = MemoryDb::new();
        db.insert_parcel(&parcel("p1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        db.mark_parcel_paid(&payment("p1")).await.unwrap();
        let err = db.mark_parcel_paid(&payment("p1")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert_eq!(db.list_payments(None).await.unwrap().len(), 1);
        let stored = db.get_parcel("p1").await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert!(stored.payment_time.is_some());
    }

    #[tokio::test]
    async fn test_mark_paid_missing_parcel_writes_nothing() {
        let db = MemoryDb::new();
        let err = db.mark_parcel_paid(&payment("nope")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(db.list_payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_then_deliver_releases_rider() {
        let db = MemoryDb::new();
        db.insert_parcel(&parcel("p1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        db.insert_rider(&rider("r1")).await.unwrap();

        let result = db
            .assign_rider(&RiderAssignment {
                parcel_id: "p1".to_string(),
                rider_id: "r1".to_string(),
                delivery_status: DeliveryStatus::RiderAssign,
                at: "2026-01-02T00:00:00.000000Z".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(result.rider.modified_count, 1);

        let busy = db.get_rider("r1").await.unwrap().unwrap();
        assert_eq!(busy.work_status, WorkStatus::InDelivery);

        db.set_delivery_status("p1", DeliveryStatus::InTransit, "2026-01-03T00:00:00Z")
            .await
            .unwrap();
        db.set_delivery_status("p1", DeliveryStatus::Delivered, "2026-01-04T00:00:00Z")
            .await
            .unwrap();

        let idle = db.get_rider("r1").await.unwrap().unwrap();
        assert_eq!(idle.work_status, WorkStatus::Idle);
    }

    fn assignment(parcel_id: &str, rider_id: &str) -> RiderAssignment {
        RiderAssignment {
            parcel_id: parcel_id.to_string(),
            rider_id: rider_id.to_string(),
            delivery_status: DeliveryStatus::RiderAssign,
            at: "2026-01-02T00:00:00.000000Z".to_string(),
        }
    }

    async fn work_status(db: &MemoryDb, rider_id: &str) -> WorkStatus {
        db.get_rider(rider_id).await.unwrap().unwrap().work_status
    }

    #[tokio::test]
    async fn test_rider_with_second_parcel_stays_busy_after_delivery() {
        let db = MemoryDb::new();
        for id in ["p1", "p2"] {
            db.insert_parcel(&parcel(id, "2026-01-01T00:00:00.000000Z"))
                .await
                .unwrap();
        }
        db.insert_rider(&rider("r1")).await.unwrap();
        db.assign_rider(&assignment("p1", "r1")).await.unwrap();
        let second = db.assign_rider(&assignment("p2", "r1")).await.unwrap();
        assert_eq!(second.rider.modified_count, 0);

        for status in [DeliveryStatus::InTransit, DeliveryStatus::Delivered] {
            db.set_delivery_status("p1", status, "2026-01-03T00:00:00Z")
                .await
                .unwrap();
        }
        assert_eq!(work_status(&db, "r1").await, WorkStatus::InDelivery);

        for status in [DeliveryStatus::InTransit, DeliveryStatus::Delivered] {
            db.set_delivery_status("p2", status, "2026-01-04T00:00:00Z")
                .await
                .unwrap();
        }
        assert_eq!(work_status(&db, "r1").await, WorkStatus::Idle);
    }

    #[tokio::test]
    async fn test_reassignment_releases_previous_rider() {
        let db = MemoryDb::new();
        for id in ["p1", "p2"] {
            db.insert_parcel(&parcel(id, "2026-01-01T00:00:00.000000Z"))
                .await
                .unwrap();
        }
        for id in ["r1", "r2", "r3"] {
            db.insert_rider(&rider(id)).await.unwrap();
        }

        db.assign_rider(&assignment("p1", "r1")).await.unwrap();
        db.assign_rider(&assignment("p1", "r2")).await.unwrap();
        assert_eq!(work_status(&db, "r1").await, WorkStatus::Idle);
        assert_eq!(work_status(&db, "r2").await, WorkStatus::InDelivery);

        // r2 keeps p2 after losing p1.
        db.assign_rider(&assignment("p2", "r2")).await.unwrap();
        db.assign_rider(&assignment("p1", "r3")).await.unwrap();
        assert_eq!(work_status(&db, "r2").await, WorkStatus::InDelivery);

        let stored = db.get_parcel("p1").await.unwrap().unwrap();
        assert_eq!(stored.assigned_rider_id.as_deref(), Some("r3"));
    }

    #[tokio::test]
    async fn test_unassigning_and_deleting_release_rider() {
        let db = MemoryDb::new();
        for id in ["p1", "p2"] {
            db.insert_parcel(&parcel(id, "2026-01-01T00:00:00.000000Z"))
                .await
                .unwrap();
        }
        db.insert_rider(&rider("r1")).await.unwrap();
        db.insert_rider(&rider("r2")).await.unwrap();

        db.assign_rider(&assignment("p1", "r1")).await.unwrap();
        db.set_delivery_status("p1", DeliveryStatus::Pending, "2026-01-03T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(work_status(&db, "r1").await, WorkStatus::Idle);

        db.assign_rider(&assignment("p2", "r2")).await.unwrap();
        db.delete_parcel("p2").await.unwrap();
        assert_eq!(work_status(&db, "r2").await, WorkStatus::Idle);
    }

    #[tokio::test]
    async fn test_rider_status_reports_whether_it_changed() {
        let db = MemoryDb::new();
        db.insert_rider(&rider("r1")).await.unwrap();

        let same = db
            .set_rider_status("r1", RiderStatus::Active, "2026-01-02T00:00:00Z")
            .await
            .unwrap()
            .unwrap();
        assert!(!same.modified);
        assert!(same.rider.updated_at.is_none());

        let changed = db
            .set_rider_status("r1", RiderStatus::Offline, "2026-01-02T00:00:00Z")
            .await
            .unwrap()
            .unwrap();
        assert!(changed.modified);
        assert_eq!(changed.rider.status, RiderStatus::Offline);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_parcel_unchanged() {
        let db = MemoryDb::new();
        db.insert_parcel(&parcel("p1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        let err = db
            .set_delivery_status("p1", DeliveryStatus::Delivered, "2026-01-02T00:00:00Z")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let stored = db.get_parcel("p1").await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Pending);
        assert!(stored.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_assign_missing_rider_leaves_parcel_unchanged() {
        let db = MemoryDb::new();
        db.insert_parcel(&parcel("p1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        let err = db
            .assign_rider(&RiderAssignment {
                parcel_id: "p1".to_string(),
                rider_id: "ghost".to_string(),
                delivery_status: DeliveryStatus::RiderAssign,
                at: "2026-01-02T00:00:00Z".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(db
            .get_parcel("p1")
            .await
            .unwrap()
            .unwrap()
            .assigned_rider_id
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_user_role_creates_missing_user() {
        let db = MemoryDb::new();
        let result = db
            .upsert_user_role("new@example.com", UserRole::Rider, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert!(result.upserted_id.is_some());

        let again = db
            .upsert_user_role("new@example.com", UserRole::Rider, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(again.matched_count, 1);
        assert_eq!(again.modified_count, 0);
    }
}
