//! Error types for the booking engine

use thiserror::Error;

/// Result type for booking operations
pub type Result<T> = std::result::Result<T, Error>;

/// Booking engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Property not found
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// No payment matches the gateway order id
    #[error("Payment order not found: {0}")]
    OrderNotFound(String),

    /// Payment not found by internal id
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Purchase-exclusivity violation
    #[error("Property already booked/purchased: {0}")]
    AlreadyBooked(String),

    /// Callback signature did not match
    #[error("Payment signature mismatch for order: {0}")]
    SignatureMismatch(String),

    /// Verification callback for an order that already failed
    #[error("Payment already failed for order: {0}")]
    PaymentFailed(String),

    /// Gateway refused the request (recovered via synthetic order ids
    /// during order creation; surfaced only from verification paths)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
