//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `booking_orders_created_total` - Orders created (pending payments)
//! - `booking_gateway_fallbacks_total` - Synthetic order-id fallbacks
//! - `booking_payments_verified_total` - Pending -> Success transitions
//! - `booking_payments_failed_total` - Pending -> Failed transitions
//! - `booking_duplicate_callbacks_total` - Idempotent verify no-ops
//! - `booking_side_effect_failures_total` - Receipt/notification failures

use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector for the booking engine
///
/// Counters are registered on an engine-owned registry so multiple
/// engines can coexist in one process (tests open several).
#[derive(Clone)]
pub struct Metrics {
    /// Orders created
    pub orders_created: IntCounter,

    /// Synthetic order-id fallbacks
    pub gateway_fallbacks: IntCounter,

    /// Payments verified successfully
    pub payments_verified: IntCounter,

    /// Payments transitioned to Failed
    pub payments_failed: IntCounter,

    /// Duplicate callback deliveries short-circuited
    pub duplicate_callbacks: IntCounter,

    /// Detached side-effect failures
    pub side_effect_failures: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let orders_created = IntCounter::new(
            "booking_orders_created_total",
            "Orders created (pending payments)",
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let gateway_fallbacks = IntCounter::new(
            "booking_gateway_fallbacks_total",
            "Synthetic order-id fallbacks after gateway errors",
        )?;
        registry.register(Box::new(gateway_fallbacks.clone()))?;

        let payments_verified = IntCounter::new(
            "booking_payments_verified_total",
            "Payments verified successfully",
        )?;
        registry.register(Box::new(payments_verified.clone()))?;

        let payments_failed = IntCounter::new(
            "booking_payments_failed_total",
            "Payments transitioned to Failed",
        )?;
        registry.register(Box::new(payments_failed.clone()))?;

        let duplicate_callbacks = IntCounter::new(
            "booking_duplicate_callbacks_total",
            "Duplicate verification callbacks short-circuited",
        )?;
        registry.register(Box::new(duplicate_callbacks.clone()))?;

        let side_effect_failures = IntCounter::new(
            "booking_side_effect_failures_total",
            "Receipt or notification failures after settlement",
        )?;
        registry.register(Box::new(side_effect_failures.clone()))?;

        Ok(Self {
            orders_created,
            gateway_fallbacks,
            payments_verified,
            payments_failed,
            duplicate_callbacks,
            side_effect_failures,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.orders_created.inc();
        assert_eq!(a.orders_created.get(), 1);
        assert_eq!(b.orders_created.get(), 0);
    }
}
