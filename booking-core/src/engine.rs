//! Booking engine orchestration
//!
//! Ties the stores, the payment gateway, and the side-effect
//! collaborators into the payment/booking lifecycle:
//!
//! 1. `create_order` validates eligibility, computes amounts, requests a
//!    gateway order handle (synthetic fallback on gateway failure), and
//!    persists a Pending payment.
//! 2. `verify_payment` authenticates the callback, wins or loses the
//!    Pending -> Success transition, applies the property/subscription
//!    state changes in the same storage transaction, then fires detached
//!    side effects and evicts the read-model cache.

use crate::{
    collaborators::{
        ListingCacheHook, NoopCacheHook, NoopNotifier, NoopObjectStore, Notifier, ObjectStore,
        PlainTextReceipts, ReceiptGenerator,
    },
    config::Config,
    error::{Error, Result},
    gateway::{CallbackVerifier, PaymentGateway, SyntheticGateway},
    metrics::Metrics,
    storage::{SettleOutcome, SettleResolution, Settlement, Storage},
    types::{
        ApplicationStatus, Availability, Occupancy, Payment, PaymentDetail, PaymentKind,
        PaymentStatus, RentSubscription,
    },
};
use chrono::{DateTime, Months, NaiveDate, Utc};
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Payment & booking lifecycle engine
pub struct BookingEngine {
    /// Durable stores
    storage: Arc<Storage>,

    /// Payment gateway (synthetic by default)
    gateway: Arc<dyn PaymentGateway>,

    /// Callback signature verifier
    verifier: CallbackVerifier,

    /// Notification collaborator
    notifier: Arc<dyn Notifier>,

    /// Receipt generation collaborator
    receipts: Arc<dyn ReceiptGenerator>,

    /// Object storage collaborator
    objects: Arc<dyn ObjectStore>,

    /// Read-model eviction hook
    cache_hook: Arc<dyn ListingCacheHook>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl BookingEngine {
    /// Open the engine with configuration and default collaborators
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        Self::with_storage(config, storage)
    }

    /// Build on an already-open storage handle
    pub fn with_storage(config: Config, storage: Arc<Storage>) -> Result<Self> {
        let verifier = CallbackVerifier::new(&config.gateway);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        if config.gateway.has_live_keys() {
            tracing::info!("Gateway keys configured; wire a live client via with_gateway");
        } else {
            tracing::info!("Placeholder gateway keys; orders use synthetic ids");
        }

        Ok(Self {
            storage,
            gateway: Arc::new(SyntheticGateway),
            verifier,
            notifier: Arc::new(NoopNotifier),
            receipts: Arc::new(PlainTextReceipts),
            objects: Arc::new(NoopObjectStore),
            cache_hook: Arc::new(NoopCacheHook),
            metrics,
            config,
        })
    }

    /// Replace the payment gateway
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Replace the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the receipt generator
    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptGenerator>) -> Self {
        self.receipts = receipts;
        self
    }

    /// Replace the object store
    pub fn with_object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = objects;
        self
    }

    /// Attach the read-model eviction hook
    pub fn with_cache_hook(mut self, hook: Arc<dyn ListingCacheHook>) -> Self {
        self.cache_hook = hook;
        self
    }

    /// Shared storage handle (the read model builds on the same stores)
    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Create a pending booking order for (payer, property)
    pub async fn create_order(&self, payer_id: Uuid, property_id: Uuid) -> Result<PaymentDetail> {
        let payer = self.storage.get_user(payer_id)?;
        let property = self.storage.get_property(property_id)?;
        let owner = self.storage.get_user(property.owner_id)?;

        let kind = property.payment_kind();

        // Precheck before the gateway round-trip; insert_order re-checks
        // inside its critical section
        if kind == PaymentKind::Purchase && self.storage.has_success_purchase(property_id)? {
            return Err(Error::AlreadyBooked(property_id.to_string()));
        }

        let total_amount = property.total_payable();
        let mut amount = total_amount.min(self.config.gateway.booking_cap);
        if amount <= rust_decimal::Decimal::ZERO {
            // Gateways reject zero-amount orders
            amount = self.config.gateway.min_amount;
        }
        let remaining_amount = total_amount - amount;

        let payment_id = Uuid::now_v7();
        let gateway_order_id = self
            .request_order_id(amount, &payment_id.to_string())
            .await;

        let now = Utc::now();
        let payment = Payment {
            id: payment_id,
            gateway_order_id,
            gateway_payment_id: None,
            payer_id,
            property_id,
            owner_id: property.owner_id,
            amount,
            total_amount,
            remaining_amount,
            kind,
            status: PaymentStatus::Pending,
            currency: self.config.gateway.currency.clone(),
            paid_at: None,
            rent_month: None,
            next_due_date: None,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        };

        self.storage.insert_order(&payment)?;
        self.metrics.orders_created.inc();

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.gateway_order_id,
            kind = %kind,
            amount = %amount,
            total = %total_amount,
            "Order created"
        );

        Ok(PaymentDetail {
            payment,
            payer,
            property,
            owner,
        })
    }

    /// Request a gateway order id, falling back to a synthetic id when the
    /// gateway errors or exceeds the bounded timeout
    async fn request_order_id(&self, amount: rust_decimal::Decimal, receipt: &str) -> String {
        let timeout = Duration::from_millis(self.config.gateway.timeout_ms);
        let call = self
            .gateway
            .create_order(amount, &self.config.gateway.currency, receipt);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(order)) => order.order_id,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Gateway order creation failed; using synthetic id");
                self.metrics.gateway_fallbacks.inc();
                SyntheticGateway::order_id()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.gateway.timeout_ms,
                    "Gateway order creation timed out; using synthetic id"
                );
                self.metrics.gateway_fallbacks.inc();
                SyntheticGateway::order_id()
            }
        }
    }

    /// Process a gateway verification callback
    ///
    /// Idempotent against duplicate delivery: once the order has left
    /// Pending no state transition is re-applied. A duplicate of a
    /// successful settlement returns the stored record; a callback for
    /// an order that already failed surfaces [`Error::PaymentFailed`].
    pub async fn verify_payment(
        &self,
        order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<PaymentDetail> {
        let signature_check = self.verifier.verify(order_id, gateway_payment_id, signature);

        let outcome = self.storage.settle_order(order_id, |payment| {
            if signature_check.is_err() {
                let mut failed = payment;
                failed.status = PaymentStatus::Failed;
                failed.updated_at = Utc::now();
                return Ok(SettleResolution::Reject {
                    payment: failed,
                    reason: Error::SignatureMismatch(order_id.to_string()),
                });
            }
            self.resolve_settlement(payment, gateway_payment_id)
        })?;

        match outcome {
            SettleOutcome::Applied(payment) => {
                self.metrics.payments_verified.inc();
                let property_id = payment.property_id;
                let detail = self.resolve(payment)?;

                // Eviction after the commit, never before
                self.cache_hook.property_changed(property_id);

                self.spawn_side_effects(detail.clone());
                Ok(detail)
            }
            SettleOutcome::AlreadySettled(payment) => {
                self.metrics.duplicate_callbacks.inc();
                if payment.status != PaymentStatus::Success {
                    // A retry for a failed order must not read as a
                    // payment confirmation
                    tracing::warn!(
                        order_id,
                        status = %payment.status,
                        "Verification callback for an already failed order"
                    );
                    return Err(Error::PaymentFailed(order_id.to_string()));
                }
                tracing::warn!(
                    order_id,
                    status = %payment.status,
                    "Duplicate verification callback; returning stored record"
                );
                self.resolve(payment)
            }
            SettleOutcome::Rejected { payment, reason } => {
                self.metrics.payments_failed.inc();
                tracing::warn!(
                    order_id,
                    payment_id = %payment.id,
                    error = %reason,
                    "Settlement rejected; payment failed"
                );
                Err(reason)
            }
        }
    }

    /// Compute the full settlement for a pending payment
    fn resolve_settlement(
        &self,
        mut payment: Payment,
        gateway_payment_id: &str,
    ) -> Result<SettleResolution> {
        let now = Utc::now();

        // Re-check purchase exclusivity under the settlement lock. Two
        // pending purchase orders can coexist when both were created
        // before either settled; only the first settlement may commit.
        if payment.kind == PaymentKind::Purchase
            && self.storage.has_success_purchase(payment.property_id)?
        {
            let property_id = payment.property_id;
            payment.status = PaymentStatus::Failed;
            payment.updated_at = now;
            return Ok(SettleResolution::Reject {
                payment,
                reason: Error::AlreadyBooked(property_id.to_string()),
            });
        }

        payment.status = PaymentStatus::Success;
        payment.gateway_payment_id = Some(gateway_payment_id.to_string());
        payment.paid_at = Some(now);
        payment.updated_at = now;

        let mut property = self.storage.get_property(payment.property_id)?;

        let settlement = match payment.kind {
            PaymentKind::Rent => {
                property.occupancy = Occupancy::Occupied;
                property.availability = Availability::Rented;

                let paid_date = now.date_naive();
                let next_due = next_month(paid_date);
                payment.rent_month = Some(rent_month_label(now));
                payment.next_due_date = Some(next_due);

                let monthly_rent = property.rent_amount.unwrap_or(payment.total_amount);
                let subscription = match self
                    .storage
                    .get_subscription(payment.payer_id, property.id)?
                {
                    Some(mut sub) => {
                        sub.monthly_rent = monthly_rent;
                        sub.next_due_date = next_due;
                        sub.last_payment_id = payment.id;
                        sub.active = true;
                        sub
                    }
                    None => RentSubscription {
                        renter_id: payment.payer_id,
                        property_id: property.id,
                        owner_id: property.owner_id,
                        monthly_rent,
                        start_date: paid_date,
                        next_due_date: next_due,
                        last_payment_id: payment.id,
                        active: true,
                    },
                };

                // Best effort: approve a matching pending application
                let payer = self.storage.get_user(payment.payer_id)?;
                let application = self
                    .storage
                    .get_application(property.id, &payer.email)?
                    .filter(|app| app.status == ApplicationStatus::Pending)
                    .map(|mut app| {
                        app.status = ApplicationStatus::Approved;
                        app
                    });

                Settlement {
                    payment,
                    property,
                    subscription: Some(subscription),
                    application,
                    mark_purchased: false,
                }
            }
            PaymentKind::Purchase => {
                property.buyer_id = Some(payment.payer_id);
                property.sold_at = Some(now);
                property.availability = Availability::Sold;
                property.occupancy = Occupancy::Occupied;

                Settlement {
                    payment,
                    property,
                    subscription: None,
                    application: None,
                    mark_purchased: true,
                }
            }
        };

        Ok(SettleResolution::Commit(Box::new(settlement)))
    }

    /// Fire-and-forget receipt + notification chain
    ///
    /// Detached from the settlement transaction; holds no store locks and
    /// is never awaited by the verify caller.
    fn spawn_side_effects(&self, detail: PaymentDetail) {
        let storage = Arc::clone(&self.storage);
        let receipts = Arc::clone(&self.receipts);
        let objects = Arc::clone(&self.objects);
        let notifier = Arc::clone(&self.notifier);
        let failures = self.metrics.side_effect_failures.clone();

        tokio::spawn(async move {
            if let Err(e) =
                run_side_effects(storage, receipts, objects, notifier, detail).await
            {
                failures.inc();
                tracing::warn!(error = %e, "Post-settlement side effects failed");
            }
        });
    }

    /// Get payment by id with relations resolved
    pub fn payment(&self, payment_id: Uuid) -> Result<PaymentDetail> {
        let payment = self.storage.get_payment(payment_id)?;
        self.resolve(payment)
    }

    /// Payments made by a user, relations resolved
    pub fn payments_by_payer(&self, payer_id: Uuid) -> Result<Vec<PaymentDetail>> {
        self.storage
            .payments_by_payer(payer_id)?
            .into_iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    /// Payments received by a property owner, relations resolved
    pub fn payments_by_owner(&self, owner_id: Uuid) -> Result<Vec<PaymentDetail>> {
        self.storage
            .payments_by_owner(owner_id)?
            .into_iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    /// All payments, relations resolved
    pub fn all_payments(&self) -> Result<Vec<PaymentDetail>> {
        self.storage
            .all_payments()?
            .into_iter()
            .map(|p| self.resolve(p))
            .collect()
    }

    /// Whether the payer holds a successful purchase of the property
    ///
    /// Rent payments are recurring and never block, so only
    /// Success + Purchase rows count.
    pub fn has_booked(&self, payer_id: Uuid, property_id: Uuid) -> Result<bool> {
        Ok(self.storage.payments_by_payer(payer_id)?.iter().any(|p| {
            p.property_id == property_id
                && p.status == PaymentStatus::Success
                && p.kind == PaymentKind::Purchase
        }))
    }

    /// Delete a payment by id
    pub fn delete_payment(&self, payment_id: Uuid) -> Result<()> {
        self.storage.delete_payment(payment_id)
    }

    /// Delete a property and all dependent rows, then evict read models
    pub fn delete_property(&self, property_id: Uuid) -> Result<()> {
        self.storage.delete_property_cascade(property_id)?;
        self.cache_hook.property_changed(property_id);
        Ok(())
    }

    /// Eagerly resolve payer/property/owner for a payment row
    fn resolve(&self, payment: Payment) -> Result<PaymentDetail> {
        let payer = self.storage.get_user(payment.payer_id)?;
        let property = self.storage.get_property(payment.property_id)?;
        let owner = self.storage.get_user(payment.owner_id)?;
        Ok(PaymentDetail {
            payment,
            payer,
            property,
            owner,
        })
    }
}

/// Billing period label for a rent payment, e.g. "MARCH 2025"
fn rent_month_label(paid_at: DateTime<Utc>) -> String {
    paid_at.format("%B %Y").to_string().to_uppercase()
}

/// One billing period forward
fn next_month(date: NaiveDate) -> NaiveDate {
    // Overflow is only possible at the far end of the calendar
    date.checked_add_months(Months::new(1)).unwrap_or(date)
}

/// Detached receipt -> upload -> notify chain
async fn run_side_effects(
    storage: Arc<Storage>,
    receipts: Arc<dyn ReceiptGenerator>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    detail: PaymentDetail,
) -> Result<()> {
    let receipt = receipts.generate(&detail).await?;
    let name = format!("receipt_{}.txt", detail.payment.id);
    let url = objects.store(&receipt, &name).await?;
    storage.set_receipt_url(detail.payment.id, &url)?;

    let subject = match detail.payment.kind {
        PaymentKind::Rent => "Rent Payment Confirmation",
        PaymentKind::Purchase => "Property Purchase Confirmation",
    };
    let body = format!(
        "Dear {},\n\nYour payment of {} {} for {} was successful.\nReceipt: {}\n",
        detail.payer.full_name,
        detail.payment.amount,
        detail.payment.currency,
        detail.property.title,
        url,
    );
    notifier
        .send(&detail.payer.email, subject, &body, Some(&receipt))
        .await?;

    tracing::debug!(payment_id = %detail.payment.id, "Side effects completed");
    Ok(())
}
