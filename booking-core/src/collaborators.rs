//! External collaborator seams
//!
//! Receipt generation, object storage, and notification delivery run as
//! detached side effects after a payment settles; a failure in any of
//! them is logged and never rolls back the financial transition. The
//! cache hook is invoked after a mutating transaction commits so the
//! read model can evict stale entries.

use crate::error::Result;
use crate::types::PaymentDetail;
use async_trait::async_trait;
use uuid::Uuid;

/// Delivers a message to a recipient, asynchronously
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message with an optional attachment
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&[u8]>,
    ) -> Result<()>;
}

/// Produces a receipt document for a settled payment
#[async_trait]
pub trait ReceiptGenerator: Send + Sync {
    /// Render the receipt as bytes
    async fn generate(&self, detail: &PaymentDetail) -> Result<Vec<u8>>;
}

/// Stores binary content durably and returns its URL
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `content` under `name`, returning a durable URL
    async fn store(&self, content: &[u8], name: &str) -> Result<String>;
}

/// Eviction seam for the read-model cache
///
/// Called only after the triggering write's transaction has committed.
pub trait ListingCacheHook: Send + Sync {
    /// A property's persisted state changed
    fn property_changed(&self, property_id: Uuid);
}

/// Notifier that drops messages, logging at debug level
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
        _attachment: Option<&[u8]>,
    ) -> Result<()> {
        tracing::debug!(recipient, subject, "Notification dropped (noop notifier)");
        Ok(())
    }
}

/// Renders a minimal plain-text receipt
#[derive(Debug, Default)]
pub struct PlainTextReceipts;

#[async_trait]
impl ReceiptGenerator for PlainTextReceipts {
    async fn generate(&self, detail: &PaymentDetail) -> Result<Vec<u8>> {
        let receipt = format!(
            "RECEIPT {id}\n\
             Payer: {payer}\n\
             Property: {property}\n\
             Amount: {amount} {currency}\n\
             Kind: {kind}\n",
            id = detail.payment.id,
            payer = detail.payer.full_name,
            property = detail.property.title,
            amount = detail.payment.amount,
            currency = detail.payment.currency,
            kind = detail.payment.kind,
        );
        Ok(receipt.into_bytes())
    }
}

/// Object store that fabricates URLs without persisting anything
#[derive(Debug, Default)]
pub struct NoopObjectStore;

#[async_trait]
impl ObjectStore for NoopObjectStore {
    async fn store(&self, _content: &[u8], name: &str) -> Result<String> {
        Ok(format!("noop://receipts/{}", name))
    }
}

/// Cache hook that ignores every event
#[derive(Debug, Default)]
pub struct NoopCacheHook;

impl ListingCacheHook for NoopCacheHook {
    fn property_changed(&self, _property_id: Uuid) {}
}
