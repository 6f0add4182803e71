//! Property-based tests for booking invariants
//!
//! - `amount == min(total, cap)` and `amount > 0` for every created order
//! - `remaining == total - amount` for every created order
//! - At most one Success + Purchase payment per property, regardless of
//!   how many payers attempt the purchase

use booking_core::{
    Availability, BookingEngine, Config, Error, Occupancy, PaymentKind, PaymentStatus, Property,
    PropertyType, Purpose, User, UserRole,
};
use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

/// Strategy for totals spanning zero, below-cap, at-cap, and above-cap
fn total_strategy() -> impl Strategy<Value = Decimal> {
    (0u64..10_000_000u64).prop_map(Decimal::from)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn open_engine(dir: &TempDir) -> BookingEngine {
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    BookingEngine::open(config).unwrap()
}

fn seed(engine: &BookingEngine, purpose: Purpose, total: Decimal) -> (User, Property) {
    let owner = User {
        id: Uuid::now_v7(),
        full_name: "Owner".to_string(),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        role: UserRole::Builder,
    };
    engine.storage().put_user(&owner).unwrap();

    let payer = User {
        id: Uuid::now_v7(),
        full_name: "Payer".to_string(),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        role: UserRole::Customer,
    };
    engine.storage().put_user(&payer).unwrap();

    let property = Property {
        id: Uuid::now_v7(),
        title: "Test Listing".to_string(),
        description: String::new(),
        city: "Nagpur".to_string(),
        locality: "Dharampeth".to_string(),
        purpose,
        property_type: PropertyType::Villa,
        price: Some(total),
        rent_amount: Some(total),
        bedrooms: None,
        bathrooms: None,
        area_sqft: None,
        availability: Availability::Available,
        occupancy: Occupancy::Vacant,
        owner_id: owner.id,
        buyer_id: None,
        sold_at: None,
        verified: true,
        image_url: None,
        created_at: Utc::now(),
    };
    engine.storage().put_property(&property).unwrap();

    (payer, property)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn amount_invariants_hold(total in total_strategy()) {
        let rt = runtime();
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        let (payer, property) = seed(&engine, Purpose::Buy, total);

        let detail = rt
            .block_on(engine.create_order(payer.id, property.id))
            .unwrap();
        let payment = detail.payment;

        let cap = Decimal::from(25_000);
        let expected = if total.min(cap) <= Decimal::ZERO {
            Decimal::ONE
        } else {
            total.min(cap)
        };

        prop_assert_eq!(payment.amount, expected);
        prop_assert!(payment.amount > Decimal::ZERO);
        prop_assert_eq!(payment.remaining_amount, payment.total_amount - payment.amount);
        prop_assert_eq!(payment.total_amount, total);
        prop_assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn at_most_one_success_purchase(attempts in 2usize..6) {
        let rt = runtime();
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        let (_, property) = seed(&engine, Purpose::Buy, Decimal::from(500_000));

        // Every order is created while no purchase has succeeded, so all
        // of them pass creation and contend at settlement time
        let mut order_ids = Vec::with_capacity(attempts);
        for _ in 0..attempts {
            let payer = User {
                id: Uuid::now_v7(),
                full_name: "Bidder".to_string(),
                email: format!("{}@example.com", Uuid::new_v4().simple()),
                role: UserRole::Customer,
            };
            engine.storage().put_user(&payer).unwrap();

            let detail = rt
                .block_on(engine.create_order(payer.id, property.id))
                .unwrap();
            order_ids.push(detail.payment.gateway_order_id);
        }

        let mut successes = 0usize;
        let mut rejected = 0usize;
        for order_id in &order_ids {
            match rt.block_on(engine.verify_payment(order_id, "pay_prop", "sig")) {
                Ok(verified) => {
                    prop_assert_eq!(verified.payment.status, PaymentStatus::Success);
                    successes += 1;
                }
                Err(Error::AlreadyBooked(_)) => rejected += 1,
                Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {}", e))),
            }
        }

        prop_assert_eq!(successes, 1);
        prop_assert_eq!(rejected, attempts - 1);

        let payments = engine.storage().all_payments().unwrap();
        let success_purchases = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Success && p.kind == PaymentKind::Purchase)
            .count();
        let failed = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Failed)
            .count();
        prop_assert_eq!(success_purchases, 1);
        prop_assert_eq!(failed, attempts - 1);
    }
}
