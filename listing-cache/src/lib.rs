//! Read-model cache and listing service for the property marketplace
//!
//! Sits in front of [`booking_core`]'s property store and serves the
//! hot read paths (listing pages, search, detail, city list) from an
//! in-process TTL cache. Invalidation is deliberately coarse: any
//! property write clears whole cache groups rather than tracking which
//! cached pages a row appears on.
//!
//! The cache implements [`booking_core::ListingCacheHook`], so a
//! payment engine wired with it evicts stale listings the moment a
//! settlement flips a property to sold or rented.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod cache;
pub mod error;
pub mod listing;

pub use cache::{CacheConfig, CacheGroup, CacheKey, CachedView, ReadModelCache, SearchFilter};
pub use error::{Error, Result};
pub use listing::{ListingService, PropertyDetailView, PropertySummary, PropertyUpdate};
