//! Payment gateway integration
//!
//! Order creation goes through the [`PaymentGateway`] trait. When no live
//! keys are configured, or when the gateway errors or times out, the
//! engine falls back to locally generated synthetic order ids so booking
//! is never blocked by gateway availability.
//!
//! Callback verification computes HMAC-SHA256 over
//! `"{order_id}|{payment_id}"` with the key secret, matching the
//! gateway's signature construction.

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;

/// An order handle issued by the payment gateway
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    /// Gateway-side order id
    pub order_id: String,
}

/// External payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for `amount` in `currency`
    ///
    /// `receipt` is the caller's idempotency reference for the order.
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder>;
}

/// Locally generated order ids, used when no live gateway is configured
/// and as the degradation path when the real gateway is unreachable
#[derive(Debug, Default)]
pub struct SyntheticGateway;

impl SyntheticGateway {
    /// Generate a synthetic order id
    ///
    /// Millis plus entropy: two orders created in the same millisecond
    /// must not collide in the order index.
    pub fn order_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
        format!("order_{}{}", millis, suffix)
    }
}

#[async_trait]
impl PaymentGateway for SyntheticGateway {
    async fn create_order(
        &self,
        _amount: Decimal,
        _currency: &str,
        _receipt: &str,
    ) -> Result<GatewayOrder> {
        Ok(GatewayOrder {
            order_id: Self::order_id(),
        })
    }
}

/// Verifies gateway callback signatures
#[derive(Debug, Clone)]
pub struct CallbackVerifier {
    key_secret: String,
    enabled: bool,
}

impl CallbackVerifier {
    /// Build from gateway configuration
    ///
    /// With a placeholder secret, verification is disabled and the
    /// transport is trusted (dev mode).
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            key_secret: config.key_secret.clone(),
            enabled: config.can_verify_signatures(),
        }
    }

    /// Check a callback signature for (order_id, payment_id)
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> Result<()> {
        if !self.enabled {
            tracing::debug!(order_id, "Signature verification disabled (placeholder secret)");
            return Ok(());
        }

        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|_| Error::Config("Invalid gateway key secret".to_string()))?;
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());

        let expected = hex::encode(mac.finalize().into_bytes());
        if expected == signature {
            Ok(())
        } else {
            Err(Error::SignatureMismatch(order_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_synthetic_order_ids_unique() {
        let a = SyntheticGateway::order_id();
        let b = SyntheticGateway::order_id();
        assert!(a.starts_with("order_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verifier_accepts_valid_signature() {
        let mut config = GatewayConfig::default();
        config.key_secret = "s3cret".to_string();
        let verifier = CallbackVerifier::new(&config);

        let signature = sign("s3cret", "order_1|pay_1");
        verifier.verify("order_1", "pay_1", &signature).unwrap();
    }

    #[test]
    fn test_verifier_rejects_bad_signature() {
        let mut config = GatewayConfig::default();
        config.key_secret = "s3cret".to_string();
        let verifier = CallbackVerifier::new(&config);

        let result = verifier.verify("order_1", "pay_1", "deadbeef");
        assert!(matches!(result, Err(Error::SignatureMismatch(_))));
    }

    #[test]
    fn test_verifier_disabled_with_placeholder_secret() {
        let verifier = CallbackVerifier::new(&GatewayConfig::default());
        verifier.verify("order_1", "pay_1", "anything").unwrap();
    }
}
