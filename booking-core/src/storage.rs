//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `payments` - Payment rows (key: payment_id)
//! - `order_index` - Gateway order id -> payment_id
//! - `properties` - Property rows (key: property_id)
//! - `subscriptions` - Rent subscriptions (key: renter_id || property_id)
//! - `users` - User rows (key: user_id)
//! - `applications` - Rental applications (key: property_id || email)
//! - `indices` - Secondary indices for payment lookups, plus the
//!   success-purchase marker that enforces purchase exclusivity
//!
//! Multi-row operations (`insert_order`, `settle_order`, cascade deletes)
//! commit through a single `WriteBatch` under the store write lock, so a
//! crash mid-operation leaves no partial state and concurrent callbacks
//! for the same order cannot both win the Pending -> Success transition.

use crate::{
    error::{Error, Result},
    types::{
        Payment, PaymentKind, PaymentStatus, Property, RentSubscription, RentalApplication, User,
    },
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Column family names
const CF_PAYMENTS: &str = "payments";
const CF_ORDER_INDEX: &str = "order_index";
const CF_PROPERTIES: &str = "properties";
const CF_SUBSCRIPTIONS: &str = "subscriptions";
const CF_USERS: &str = "users";
const CF_APPLICATIONS: &str = "applications";
const CF_INDICES: &str = "indices";

/// Index key tags within `indices`
const IDX_PAYER: &[u8] = b"py:";
const IDX_OWNER: &[u8] = b"ow:";
const IDX_PROPERTY: &[u8] = b"pr:";
const IDX_SOLD: &[u8] = b"sp:";

/// The full set of rows a successful verification commits atomically
#[derive(Debug)]
pub struct Settlement {
    /// Payment flipped to Success
    pub payment: Payment,

    /// Property with its post-payment state transition applied
    pub property: Property,

    /// Upserted rent subscription (rent settlements only)
    pub subscription: Option<RentSubscription>,

    /// Approved rental application, if one matched (rent settlements only)
    pub application: Option<RentalApplication>,

    /// Record the success-purchase marker (purchase settlements only)
    pub mark_purchased: bool,
}

/// How a settlement closure resolves the pending payment
#[derive(Debug)]
pub enum SettleResolution {
    /// Commit the full settlement
    Commit(Box<Settlement>),

    /// Write the payment as Failed
    Reject {
        /// Row persisted as Failed
        payment: Payment,

        /// Why the settlement was refused (signature mismatch, lost
        /// purchase race)
        reason: Error,
    },
}

/// Outcome of a `settle_order` call
#[derive(Debug)]
pub enum SettleOutcome {
    /// This caller won the Pending -> Success transition
    Applied(Payment),

    /// The order had already left Pending; stored row returned unchanged
    AlreadySettled(Payment),

    /// The payment was transitioned to Failed
    Rejected {
        /// Row persisted as Failed
        payment: Payment,

        /// The closure's rejection reason
        reason: Error,
    },
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,

    /// Serializes read-modify-write transactions (order insert, settlement,
    /// cascade delete). Plain reads go straight to the DB.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_ORDER_INDEX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_PROPERTIES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_SUBSCRIPTIONS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_APPLICATIONS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // User operations

    /// Put user
    pub fn put_user(&self, user: &User) -> Result<()> {
        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .put_cf(cf, user.id.as_bytes(), bincode::serialize(user)?)?;
        Ok(())
    }

    /// Get user by ID
    pub fn get_user(&self, user_id: Uuid) -> Result<User> {
        let cf = self.cf_handle(CF_USERS)?;
        let value = self
            .db
            .get_cf(cf, user_id.as_bytes())?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    // Property operations

    /// Put property
    pub fn put_property(&self, property: &Property) -> Result<()> {
        let cf = self.cf_handle(CF_PROPERTIES)?;
        self.db
            .put_cf(cf, property.id.as_bytes(), bincode::serialize(property)?)?;

        tracing::debug!(property_id = %property.id, "Property written");
        Ok(())
    }

    /// Get property by ID
    pub fn get_property(&self, property_id: Uuid) -> Result<Property> {
        let cf = self.cf_handle(CF_PROPERTIES)?;
        let value = self
            .db
            .get_cf(cf, property_id.as_bytes())?
            .ok_or_else(|| Error::PropertyNotFound(property_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All property rows (read models filter and sort on top of this)
    pub fn list_properties(&self) -> Result<Vec<Property>> {
        let cf = self.cf_handle(CF_PROPERTIES)?;
        let mut properties = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            properties.push(bincode::deserialize(&value)?);
        }
        Ok(properties)
    }

    /// Properties listed by one owner
    pub fn properties_by_owner(&self, owner_id: Uuid) -> Result<Vec<Property>> {
        Ok(self
            .list_properties()?
            .into_iter()
            .filter(|p| p.owner_id == owner_id)
            .collect())
    }

    /// Distinct cities across all listings, sorted
    pub fn cities(&self) -> Result<Vec<String>> {
        let cities: BTreeSet<String> = self
            .list_properties()?
            .into_iter()
            .map(|p| p.city)
            .collect();
        Ok(cities.into_iter().collect())
    }

    // Application operations

    /// Put rental application
    pub fn put_application(&self, application: &RentalApplication) -> Result<()> {
        let cf = self.cf_handle(CF_APPLICATIONS)?;
        let key = Self::application_key(application.property_id, &application.email);
        self.db.put_cf(cf, key, bincode::serialize(application)?)?;
        Ok(())
    }

    /// Get rental application for (property, applicant email)
    pub fn get_application(
        &self,
        property_id: Uuid,
        email: &str,
    ) -> Result<Option<RentalApplication>> {
        let cf = self.cf_handle(CF_APPLICATIONS)?;
        let key = Self::application_key(property_id, email);
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Subscription operations

    /// Get rent subscription for (renter, property)
    pub fn get_subscription(
        &self,
        renter_id: Uuid,
        property_id: Uuid,
    ) -> Result<Option<RentSubscription>> {
        let cf = self.cf_handle(CF_SUBSCRIPTIONS)?;
        let key = Self::subscription_key(renter_id, property_id);
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Payment operations

    /// Get payment by ID
    pub fn get_payment(&self, payment_id: Uuid) -> Result<Payment> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let value = self
            .db
            .get_cf(cf, payment_id.as_bytes())?
            .ok_or_else(|| Error::PaymentNotFound(payment_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Get payment by gateway order id
    pub fn get_payment_by_order(&self, order_id: &str) -> Result<Payment> {
        let cf = self.cf_handle(CF_ORDER_INDEX)?;
        let value = self
            .db
            .get_cf(cf, order_id.as_bytes())?
            .ok_or_else(|| Error::OrderNotFound(order_id.to_string()))?;
        let payment_id = Self::uuid_from_slice(&value)?;
        self.get_payment(payment_id)
    }

    /// Whether a Success + Purchase payment exists for this property
    pub fn has_success_purchase(&self, property_id: Uuid) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::sold_marker_key(property_id);
        Ok(self.db.get_cf(cf, key)?.is_some())
    }

    /// Insert a freshly created Pending payment with its indices (atomic)
    ///
    /// Re-checks purchase exclusivity inside the critical section, so two
    /// concurrent order creations for a sold property cannot both pass an
    /// engine-level precheck and persist.
    pub fn insert_order(&self, payment: &Payment) -> Result<()> {
        let _guard = self.write_lock.lock();

        if payment.kind == PaymentKind::Purchase && self.has_success_purchase(payment.property_id)?
        {
            return Err(Error::AlreadyBooked(payment.property_id.to_string()));
        }

        let mut batch = WriteBatch::default();
        self.batch_put_payment(&mut batch, payment)?;

        let cf_order = self.cf_handle(CF_ORDER_INDEX)?;
        batch.put_cf(
            cf_order,
            payment.gateway_order_id.as_bytes(),
            payment.id.as_bytes(),
        );

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key(IDX_PAYER, payment.payer_id, payment.id),
            [],
        );
        batch.put_cf(
            cf_indices,
            Self::index_key(IDX_OWNER, payment.owner_id, payment.id),
            [],
        );
        batch.put_cf(
            cf_indices,
            Self::index_key(IDX_PROPERTY, payment.property_id, payment.id),
            [],
        );

        self.db.write(batch)?;

        tracing::debug!(
            payment_id = %payment.id,
            order_id = %payment.gateway_order_id,
            "Pending payment inserted"
        );

        Ok(())
    }

    /// Run the verification transaction for a gateway order
    ///
    /// Under the write lock: loads the payment, short-circuits when it has
    /// already left Pending (duplicate callback delivery), otherwise lets
    /// the closure resolve the settlement and commits every affected row
    /// in one batch. Exactly one concurrent caller observes `Applied`.
    pub fn settle_order<F>(&self, order_id: &str, settle: F) -> Result<SettleOutcome>
    where
        F: FnOnce(Payment) -> Result<SettleResolution>,
    {
        let _guard = self.write_lock.lock();

        let payment = self.get_payment_by_order(order_id)?;
        if payment.status != PaymentStatus::Pending {
            return Ok(SettleOutcome::AlreadySettled(payment));
        }

        match settle(payment)? {
            SettleResolution::Reject { payment: failed, reason } => {
                let mut batch = WriteBatch::default();
                self.batch_put_payment(&mut batch, &failed)?;
                self.db.write(batch)?;
                Ok(SettleOutcome::Rejected {
                    payment: failed,
                    reason,
                })
            }
            SettleResolution::Commit(settlement) => {
                let Settlement {
                    payment,
                    property,
                    subscription,
                    application,
                    mark_purchased,
                } = *settlement;

                let mut batch = WriteBatch::default();
                self.batch_put_payment(&mut batch, &payment)?;

                let cf_properties = self.cf_handle(CF_PROPERTIES)?;
                batch.put_cf(
                    cf_properties,
                    property.id.as_bytes(),
                    bincode::serialize(&property)?,
                );

                if let Some(ref sub) = subscription {
                    let cf_subs = self.cf_handle(CF_SUBSCRIPTIONS)?;
                    batch.put_cf(
                        cf_subs,
                        Self::subscription_key(sub.renter_id, sub.property_id),
                        bincode::serialize(sub)?,
                    );
                }

                if let Some(ref app) = application {
                    let cf_apps = self.cf_handle(CF_APPLICATIONS)?;
                    batch.put_cf(
                        cf_apps,
                        Self::application_key(app.property_id, &app.email),
                        bincode::serialize(app)?,
                    );
                }

                if mark_purchased {
                    let cf_indices = self.cf_handle(CF_INDICES)?;
                    batch.put_cf(
                        cf_indices,
                        Self::sold_marker_key(property.id),
                        payment.id.as_bytes(),
                    );
                }

                self.db.write(batch)?;

                tracing::info!(
                    payment_id = %payment.id,
                    order_id = %payment.gateway_order_id,
                    kind = %payment.kind,
                    "Payment settled"
                );

                Ok(SettleOutcome::Applied(payment))
            }
        }
    }

    /// Attach the receipt URL after the settlement committed (best effort)
    pub fn set_receipt_url(&self, payment_id: Uuid, url: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut payment = self.get_payment(payment_id)?;
        payment.receipt_url = Some(url.to_string());
        payment.updated_at = chrono::Utc::now();

        let mut batch = WriteBatch::default();
        self.batch_put_payment(&mut batch, &payment)?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Payments by payer (via index)
    pub fn payments_by_payer(&self, payer_id: Uuid) -> Result<Vec<Payment>> {
        self.payments_by_index(IDX_PAYER, payer_id)
    }

    /// Payments by property owner (via index)
    pub fn payments_by_owner(&self, owner_id: Uuid) -> Result<Vec<Payment>> {
        self.payments_by_index(IDX_OWNER, owner_id)
    }

    /// Payments by property (via index)
    pub fn payments_by_property(&self, property_id: Uuid) -> Result<Vec<Payment>> {
        self.payments_by_index(IDX_PROPERTY, property_id)
    }

    /// All payments
    pub fn all_payments(&self) -> Result<Vec<Payment>> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            payments.push(bincode::deserialize(&value)?);
        }
        Ok(payments)
    }

    /// Delete payment with its indices
    pub fn delete_payment(&self, payment_id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock();

        let payment = self.get_payment(payment_id)?;

        let mut batch = WriteBatch::default();
        self.batch_delete_payment(&mut batch, &payment)?;
        self.db.write(batch)?;

        tracing::debug!(payment_id = %payment_id, "Payment deleted");
        Ok(())
    }

    /// Delete a property and every dependent row (atomic)
    ///
    /// Explicit multi-step cleanup: payments and their indices, rental
    /// applications, subscriptions, the sold marker, then the property.
    pub fn delete_property_cascade(&self, property_id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock();

        // Existence check up front so absent ids surface as not-found
        let _ = self.get_property(property_id)?;

        let mut batch = WriteBatch::default();

        for payment in self.payments_by_property(property_id)? {
            self.batch_delete_payment(&mut batch, &payment)?;
        }

        let cf_apps = self.cf_handle(CF_APPLICATIONS)?;
        for item in self
            .db
            .prefix_iterator_cf(cf_apps, property_id.as_bytes())
        {
            let (key, _) = item?;
            if key.starts_with(property_id.as_bytes()) {
                batch.delete_cf(cf_apps, key);
            }
        }

        // Subscriptions are keyed renter-first; a property delete is rare
        // enough that a full scan is acceptable
        let cf_subs = self.cf_handle(CF_SUBSCRIPTIONS)?;
        for item in self.db.iterator_cf(cf_subs, IteratorMode::Start) {
            let (key, value) = item?;
            let sub: RentSubscription = bincode::deserialize(&value)?;
            if sub.property_id == property_id {
                batch.delete_cf(cf_subs, key);
            }
        }

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(cf_indices, Self::sold_marker_key(property_id));

        let cf_properties = self.cf_handle(CF_PROPERTIES)?;
        batch.delete_cf(cf_properties, property_id.as_bytes());

        self.db.write(batch)?;

        tracing::info!(property_id = %property_id, "Property deleted with dependents");
        Ok(())
    }

    // Batch helpers

    fn batch_put_payment(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        batch.put_cf(cf, payment.id.as_bytes(), bincode::serialize(payment)?);
        Ok(())
    }

    fn batch_delete_payment(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        let cf_payments = self.cf_handle(CF_PAYMENTS)?;
        batch.delete_cf(cf_payments, payment.id.as_bytes());

        let cf_order = self.cf_handle(CF_ORDER_INDEX)?;
        batch.delete_cf(cf_order, payment.gateway_order_id.as_bytes());

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(
            cf_indices,
            Self::index_key(IDX_PAYER, payment.payer_id, payment.id),
        );
        batch.delete_cf(
            cf_indices,
            Self::index_key(IDX_OWNER, payment.owner_id, payment.id),
        );
        batch.delete_cf(
            cf_indices,
            Self::index_key(IDX_PROPERTY, payment.property_id, payment.id),
        );
        Ok(())
    }

    fn payments_by_index(&self, tag: &[u8], id: Uuid) -> Result<Vec<Payment>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = tag.to_vec();
        prefix.extend_from_slice(id.as_bytes());

        let mut payments = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, &prefix) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let payment_id = Self::uuid_from_slice(&key[prefix.len()..])?;
            payments.push(self.get_payment(payment_id)?);
        }
        Ok(payments)
    }

    // Key helpers

    fn index_key(tag: &[u8], id: Uuid, payment_id: Uuid) -> Vec<u8> {
        let mut key = tag.to_vec();
        key.extend_from_slice(id.as_bytes());
        key.extend_from_slice(payment_id.as_bytes());
        key
    }

    fn sold_marker_key(property_id: Uuid) -> Vec<u8> {
        let mut key = IDX_SOLD.to_vec();
        key.extend_from_slice(property_id.as_bytes());
        key
    }

    fn subscription_key(renter_id: Uuid, property_id: Uuid) -> Vec<u8> {
        let mut key = renter_id.as_bytes().to_vec();
        key.extend_from_slice(property_id.as_bytes());
        key
    }

    fn application_key(property_id: Uuid, email: &str) -> Vec<u8> {
        let mut key = property_id.as_bytes().to_vec();
        key.extend_from_slice(email.to_lowercase().as_bytes());
        key
    }

    fn uuid_from_slice(bytes: &[u8]) -> Result<Uuid> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::Storage("Malformed uuid key".to_string()))?;
        Ok(Uuid::from_bytes(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Availability, Occupancy, PaymentKind, PaymentStatus, Property, PropertyType, Purpose,
        User, UserRole,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), dir)
    }

    fn test_user(role: UserRole) -> User {
        User {
            id: Uuid::now_v7(),
            full_name: "Asha Verma".to_string(),
            email: "asha@example.com".to_string(),
            role,
        }
    }

    fn test_property(owner_id: Uuid, purpose: Purpose) -> Property {
        Property {
            id: Uuid::now_v7(),
            title: "3BHK Garden View".to_string(),
            description: String::new(),
            city: "Mumbai".to_string(),
            locality: "Andheri".to_string(),
            purpose,
            property_type: PropertyType::Apartment,
            price: Some(Decimal::from(30_000)),
            rent_amount: Some(Decimal::from(12_000)),
            bedrooms: Some(3),
            bathrooms: Some(2),
            area_sqft: Some(1200),
            availability: Availability::Available,
            occupancy: Occupancy::Vacant,
            owner_id,
            buyer_id: None,
            sold_at: None,
            verified: true,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn test_payment(payer: Uuid, property: &Property, kind: PaymentKind) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::now_v7(),
            gateway_order_id: format!("order_{}", Uuid::new_v4().simple()),
            gateway_payment_id: None,
            payer_id: payer,
            property_id: property.id,
            owner_id: property.owner_id,
            amount: Decimal::from(25_000),
            total_amount: Decimal::from(30_000),
            remaining_amount: Decimal::from(5_000),
            kind,
            status: PaymentStatus::Pending,
            currency: "INR".to_string(),
            paid_at: None,
            rent_month: None,
            next_due_date: None,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_user_round_trip() {
        let (storage, _dir) = test_storage();
        let user = test_user(UserRole::Customer);
        storage.put_user(&user).unwrap();
        let loaded = storage.get_user(user.id).unwrap();
        assert_eq!(loaded.email, user.email);

        let missing = storage.get_user(Uuid::now_v7());
        assert!(matches!(missing, Err(Error::UserNotFound(_))));
    }

    #[test]
    fn test_order_index_lookup() {
        let (storage, _dir) = test_storage();
        let payer = test_user(UserRole::Customer);
        let property = test_property(Uuid::now_v7(), Purpose::Buy);
        storage.put_property(&property).unwrap();

        let payment = test_payment(payer.id, &property, PaymentKind::Purchase);
        storage.insert_order(&payment).unwrap();

        let loaded = storage
            .get_payment_by_order(&payment.gateway_order_id)
            .unwrap();
        assert_eq!(loaded.id, payment.id);
        assert_eq!(loaded.status, PaymentStatus::Pending);

        assert!(matches!(
            storage.get_payment_by_order("order_nope"),
            Err(Error::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_index_scans() {
        let (storage, _dir) = test_storage();
        let payer = Uuid::now_v7();
        let property = test_property(Uuid::now_v7(), Purpose::Rent);
        storage.put_property(&property).unwrap();

        for _ in 0..3 {
            let payment = test_payment(payer, &property, PaymentKind::Rent);
            storage.insert_order(&payment).unwrap();
        }
        // Unrelated payer
        let other = test_payment(Uuid::now_v7(), &property, PaymentKind::Rent);
        storage.insert_order(&other).unwrap();

        assert_eq!(storage.payments_by_payer(payer).unwrap().len(), 3);
        assert_eq!(
            storage.payments_by_owner(property.owner_id).unwrap().len(),
            4
        );
        assert_eq!(
            storage.payments_by_property(property.id).unwrap().len(),
            4
        );
        assert_eq!(storage.all_payments().unwrap().len(), 4);
    }

    #[test]
    fn test_settle_applies_once() {
        let (storage, _dir) = test_storage();
        let property = test_property(Uuid::now_v7(), Purpose::Buy);
        storage.put_property(&property).unwrap();

        let payment = test_payment(Uuid::now_v7(), &property, PaymentKind::Purchase);
        storage.insert_order(&payment).unwrap();

        let settle = |mut p: Payment| {
            p.status = PaymentStatus::Success;
            p.paid_at = Some(Utc::now());
            let mut prop = property.clone();
            prop.availability = Availability::Sold;
            Ok(SettleResolution::Commit(Box::new(Settlement {
                payment: p,
                property: prop,
                subscription: None,
                application: None,
                mark_purchased: true,
            })))
        };

        let outcome = storage
            .settle_order(&payment.gateway_order_id, settle)
            .unwrap();
        assert!(matches!(outcome, SettleOutcome::Applied(_)));
        assert!(storage.has_success_purchase(property.id).unwrap());

        // Duplicate callback: closure must not run again
        let outcome = storage
            .settle_order(&payment.gateway_order_id, |_| {
                panic!("settle closure ran for an already-settled order")
            })
            .unwrap();
        assert!(matches!(outcome, SettleOutcome::AlreadySettled(_)));
    }

    #[test]
    fn test_insert_order_blocks_purchased_property() {
        let (storage, _dir) = test_storage();
        let property = test_property(Uuid::now_v7(), Purpose::Buy);
        storage.put_property(&property).unwrap();

        let first = test_payment(Uuid::now_v7(), &property, PaymentKind::Purchase);
        storage.insert_order(&first).unwrap();
        storage
            .settle_order(&first.gateway_order_id, |mut p| {
                p.status = PaymentStatus::Success;
                Ok(SettleResolution::Commit(Box::new(Settlement {
                    payment: p,
                    property: property.clone(),
                    subscription: None,
                    application: None,
                    mark_purchased: true,
                })))
            })
            .unwrap();

        let second = test_payment(Uuid::now_v7(), &property, PaymentKind::Purchase);
        assert!(matches!(
            storage.insert_order(&second),
            Err(Error::AlreadyBooked(_))
        ));

        // Rent orders are not exclusive
        let rent = test_payment(Uuid::now_v7(), &property, PaymentKind::Rent);
        storage.insert_order(&rent).unwrap();
    }

    #[test]
    fn test_property_cascade_delete() {
        let (storage, _dir) = test_storage();
        let property = test_property(Uuid::now_v7(), Purpose::Rent);
        storage.put_property(&property).unwrap();

        let payment = test_payment(Uuid::now_v7(), &property, PaymentKind::Rent);
        storage.insert_order(&payment).unwrap();
        storage
            .put_application(&RentalApplication {
                id: Uuid::now_v7(),
                property_id: property.id,
                email: "asha@example.com".to_string(),
                status: crate::types::ApplicationStatus::Pending,
                created_at: Utc::now(),
            })
            .unwrap();

        storage.delete_property_cascade(property.id).unwrap();

        assert!(matches!(
            storage.get_property(property.id),
            Err(Error::PropertyNotFound(_))
        ));
        assert!(matches!(
            storage.get_payment(payment.id),
            Err(Error::PaymentNotFound(_))
        ));
        assert!(storage
            .get_application(property.id, "asha@example.com")
            .unwrap()
            .is_none());
        assert!(storage.payments_by_payer(payment.payer_id).unwrap().is_empty());

        assert!(matches!(
            storage.delete_property_cascade(property.id),
            Err(Error::PropertyNotFound(_))
        ));
    }

    #[test]
    fn test_cities_distinct_sorted() {
        let (storage, _dir) = test_storage();
        for city in ["Pune", "Mumbai", "Pune", "Delhi"] {
            let mut p = test_property(Uuid::now_v7(), Purpose::Buy);
            p.city = city.to_string();
            storage.put_property(&p).unwrap();
        }
        assert_eq!(storage.cities().unwrap(), vec!["Delhi", "Mumbai", "Pune"]);
    }

    #[test]
    fn test_properties_by_owner() {
        let (storage, _dir) = test_storage();
        let owner = Uuid::now_v7();
        let other = Uuid::now_v7();
        for owner_id in [owner, owner, other] {
            storage
                .put_property(&test_property(owner_id, Purpose::Buy))
                .unwrap();
        }

        let mine = storage.properties_by_owner(owner).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|p| p.owner_id == owner));
    }
}
