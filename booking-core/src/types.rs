//! Core types for the booking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode rows in RocksDB)
//! - Exact arithmetic (Decimal for money)
//! - Eager relation resolution at the engine boundary

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction kind of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentKind {
    /// One-time, exclusive purchase of the property
    Purchase,
    /// Recurring monthly rent payment
    Rent,
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentKind::Purchase => write!(f, "PURCHASE"),
            PaymentKind::Rent => write!(f, "RENT"),
        }
    }
}

/// Lifecycle status of a payment
///
/// ```text
/// Pending --(verify ok)--> Success   (terminal, fires side effects)
/// Pending --(verify rejected)--> Failed
/// Success --(external refund)--> Refunded
/// ```
///
/// `Failed` and `Refunded` are terminal. No operation in this crate
/// produces `Refunded`; the refund flow lives outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    /// Order created, awaiting gateway callback
    Pending = 1,
    /// Verified and committed
    Success = 2,
    /// Verification rejected
    Failed = 3,
    /// Refunded after success (external operation)
    Refunded = 4,
}

impl PaymentStatus {
    /// Whether any further transition is allowed from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        };
        write!(f, "{}", s)
    }
}

/// A single payment/booking transaction attempt and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Internal payment ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Gateway order handle (real or synthetic)
    pub gateway_order_id: String,

    /// Gateway transaction ID, set on successful verification
    pub gateway_payment_id: Option<String>,

    /// Paying user
    pub payer_id: Uuid,

    /// Property being booked
    pub property_id: Uuid,

    /// Property owner, denormalized at creation time
    pub owner_id: Uuid,

    /// Amount collected now (the booking amount)
    pub amount: Decimal,

    /// Full price/rent of the property
    pub total_amount: Decimal,

    /// `total_amount - amount`, settled outside the platform
    pub remaining_amount: Decimal,

    /// Purchase or rent
    pub kind: PaymentKind,

    /// Lifecycle status
    pub status: PaymentStatus,

    /// ISO 4217 currency code
    pub currency: String,

    /// Timestamp of successful verification
    pub paid_at: Option<DateTime<Utc>>,

    /// Billing period label for rent payments, e.g. "MARCH 2025"
    pub rent_month: Option<String>,

    /// Next rent due date, set only for rent payments
    pub next_due_date: Option<NaiveDate>,

    /// Durable URL of the generated receipt, set best-effort after success
    pub receipt_url: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Marketplace visibility of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    /// Listed and open for booking
    Available,
    /// Booking in progress
    Booked,
    /// Purchased, no longer listed
    Sold,
    /// Let out to a renter
    Rented,
}

/// Physical occupancy of a property, independent of marketplace visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    /// Nobody lives there
    Vacant,
    /// A renter or buyer has moved in
    Occupied,
}

/// What the listing is offered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// Offered for sale
    Buy,
    /// Offered for rent
    Rent,
}

/// Structural category of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// Flat in a residential building
    Apartment,
    /// Independent house
    Villa,
    /// Undeveloped land
    Plot,
    /// Office or retail space
    Commercial,
}

/// A property listing (booking-relevant subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    /// Property ID
    pub id: Uuid,

    /// Listing title
    pub title: String,

    /// Free-form description
    pub description: String,

    /// City
    pub city: String,

    /// Locality within the city
    pub locality: String,

    /// Buy or rent listing
    pub purpose: Purpose,

    /// Structural category
    pub property_type: PropertyType,

    /// Sale price (buy listings)
    pub price: Option<Decimal>,

    /// Monthly rent (rent listings)
    pub rent_amount: Option<Decimal>,

    /// Bedrooms
    pub bedrooms: Option<u16>,

    /// Bathrooms
    pub bathrooms: Option<u16>,

    /// Carpet area in square feet
    pub area_sqft: Option<u32>,

    /// Marketplace visibility
    pub availability: Availability,

    /// Physical occupancy
    pub occupancy: Occupancy,

    /// Listing owner (builder)
    pub owner_id: Uuid,

    /// Buyer, set on successful purchase
    pub buyer_id: Option<Uuid>,

    /// When the purchase was verified
    pub sold_at: Option<DateTime<Utc>>,

    /// Passed manual verification
    pub verified: bool,

    /// Primary image URL
    pub image_url: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// The full amount a booking of this property settles against
    ///
    /// Rent listings charge the monthly rent, buy listings the price.
    /// An unset amount is treated as zero.
    pub fn total_payable(&self) -> Decimal {
        let amount = match self.purpose {
            Purpose::Rent => self.rent_amount,
            Purpose::Buy => self.price,
        };
        amount.unwrap_or(Decimal::ZERO)
    }

    /// The payment kind a booking of this listing produces
    pub fn payment_kind(&self) -> PaymentKind {
        match self.purpose {
            Purpose::Rent => PaymentKind::Rent,
            Purpose::Buy => PaymentKind::Purchase,
        }
    }
}

/// Recurring-rent agreement derived from successful rent payments
///
/// Created on the first successful rent payment for a (renter, property)
/// pair and updated in place on every subsequent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentSubscription {
    /// Renting user
    pub renter_id: Uuid,

    /// Rented property
    pub property_id: Uuid,

    /// Property owner
    pub owner_id: Uuid,

    /// Current monthly rent
    pub monthly_rent: Decimal,

    /// First payment date
    pub start_date: NaiveDate,

    /// When the next rent payment is due
    pub next_due_date: NaiveDate,

    /// Payment that last advanced this subscription
    pub last_payment_id: Uuid,

    /// Deactivated only by an external cancellation
    pub active: bool,
}

/// Status of a rental application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Submitted, awaiting a decision
    Pending,
    /// Approved, settled by a successful rent payment
    Approved,
    /// Declined by the owner
    Rejected,
}

/// A prospective renter's application for a property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalApplication {
    /// Application ID
    pub id: Uuid,

    /// Property applied for
    pub property_id: Uuid,

    /// Applicant email (matched against the payer on verification)
    pub email: String,

    /// Current status
    pub status: ApplicationStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Marketplace role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    /// Regular buyer/renter
    Customer,
    /// Lists properties
    Builder,
    /// Platform operator
    Admin,
}

/// A platform user (booking-relevant subset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: Uuid,

    /// Full name
    pub full_name: String,

    /// Email address
    pub email: String,

    /// Role
    pub role: UserRole,
}

/// A payment with its direct relations eagerly resolved
///
/// This is the only payment shape that crosses the engine boundary for
/// reads; no partially-loaded reference escapes the component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetail {
    /// The payment row
    pub payment: Payment,

    /// Paying user
    pub payer: User,

    /// Booked property
    pub property: Property,

    /// Property owner
    pub owner: User,
}
