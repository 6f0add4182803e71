//! Error types for the read model

use thiserror::Error;

/// Result type for read-model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Read-model errors
#[derive(Error, Debug)]
pub enum Error {
    /// Listing creation attempted by a non-builder user
    #[error("User is not a builder: {0}")]
    NotABuilder(String),

    /// Underlying store error
    #[error(transparent)]
    Core(#[from] booking_core::Error),
}
