// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod id;
pub mod parcel;
pub mod payment;
pub mod rider;
pub mod user;

pub use parcel::{DeliveryStatus, Parcel, PaymentStatus};
pub use payment::PaymentRecord;
pub use rider::{Rider, RiderStatus, WorkStatus};
pub use user::{User, UserRole};
