//! Brikline Booking Core
//!
//! Payment & booking lifecycle engine for the property marketplace:
//! order creation, gateway callback verification, property state
//! transitions, rent-subscription management, and receipt generation.
//!
//! # Invariants
//!
//! - `remaining_amount == total_amount - amount` for every payment
//! - `amount == min(total_amount, booking cap)` and always positive
//! - At most one Success + Purchase payment per property
//! - Duplicate verification callbacks are no-ops after the first
//!   Pending -> Success transition

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use collaborators::{
    ListingCacheHook, NoopCacheHook, NoopNotifier, NoopObjectStore, Notifier, ObjectStore,
    PlainTextReceipts, ReceiptGenerator,
};
pub use config::{Config, GatewayConfig};
pub use engine::BookingEngine;
pub use error::{Error, Result};
pub use gateway::{CallbackVerifier, GatewayOrder, PaymentGateway, SyntheticGateway};
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    ApplicationStatus, Availability, Occupancy, Payment, PaymentDetail, PaymentKind, PaymentStatus,
    Property, PropertyType, Purpose, RentSubscription, RentalApplication, User, UserRole,
};
