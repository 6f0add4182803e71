//! Read-model cache
//!
//! Memoizes listing/search/detail/city projections keyed by request
//! parameters. Invalidation is coarse by design: any property mutation
//! clears the `listing-page` and `search-results` groups in full and
//! drops the one `property-detail` entry for the affected id, since
//! precise per-property invalidation of aggregate pages is not tractable
//! without tracking which pages reference which property.
//!
//! The only ordering contract: invalidation runs after the triggering
//! write commits, so a read after invalidation never observes a value
//! cached before the write.

use crate::listing::{PropertyDetailView, PropertySummary};
use booking_core::types::{Availability, PropertyType, Purpose};
use booking_core::ListingCacheHook;
use dashmap::DashMap;
use prometheus::{IntCounter, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Cache groups, matching the projections they hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGroup {
    /// Paginated verified-listing pages
    ListingPage,
    /// Filtered search result pages
    SearchResults,
    /// Single property detail views
    PropertyDetail,
    /// The distinct-city list
    CityList,
}

/// Filters applied to a search projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchFilter {
    /// Buy or rent listings
    pub purpose: Option<Purpose>,

    /// Structural category
    pub property_type: Option<PropertyType>,

    /// Exact city (case-insensitive)
    pub city: Option<String>,

    /// Exact locality (case-insensitive)
    pub locality: Option<String>,

    /// Marketplace visibility
    pub availability: Option<Availability>,

    /// Free-text match against title/description/city/locality
    pub text: Option<String>,
}

/// Cache key: operation name plus its parameter tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// (listing-page, page, size)
    ListingPage {
        /// Zero-based page number
        page: usize,
        /// Page size
        size: usize,
    },
    /// (search, filters..., page, size)
    Search {
        /// Applied filters
        filter: SearchFilter,
        /// Zero-based page number
        page: usize,
        /// Page size
        size: usize,
    },
    /// (property-detail, id)
    PropertyDetail {
        /// Property id
        id: Uuid,
    },
    /// (city-list)
    Cities,
}

impl CacheKey {
    /// The group this key belongs to
    pub fn group(&self) -> CacheGroup {
        match self {
            CacheKey::ListingPage { .. } => CacheGroup::ListingPage,
            CacheKey::Search { .. } => CacheGroup::SearchResults,
            CacheKey::PropertyDetail { .. } => CacheGroup::PropertyDetail,
            CacheKey::Cities => CacheGroup::CityList,
        }
    }
}

/// A memoized projection
#[derive(Debug, Clone)]
pub enum CachedView {
    /// A page of property summaries
    Summaries(Arc<Vec<PropertySummary>>),
    /// A single property detail
    Detail(Arc<PropertyDetailView>),
    /// The distinct-city list
    Cities(Arc<Vec<String>>),
}

struct Entry {
    view: CachedView,
    inserted: Instant,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry time-to-live
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Concurrent read-model cache with TTL and coarse group invalidation
pub struct ReadModelCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,

    /// Cache hits
    pub hits: IntCounter,

    /// Cache misses (absent or expired)
    pub misses: IntCounter,

    /// Entries dropped by invalidation
    pub evictions: IntCounter,

    /// Prometheus registry (cache-owned)
    pub registry: Arc<Registry>,
}

impl ReadModelCache {
    /// Create a cache with configuration
    pub fn new(config: CacheConfig) -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let hits = IntCounter::new("listing_cache_hits_total", "Read-model cache hits")?;
        registry.register(Box::new(hits.clone()))?;

        let misses = IntCounter::new("listing_cache_misses_total", "Read-model cache misses")?;
        registry.register(Box::new(misses.clone()))?;

        let evictions = IntCounter::new(
            "listing_cache_evictions_total",
            "Read-model cache entries invalidated",
        )?;
        registry.register(Box::new(evictions.clone()))?;

        Ok(Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            hits,
            misses,
            evictions,
            registry,
        })
    }

    /// Look up a key, honoring the TTL
    pub fn get(&self, key: &CacheKey) -> Option<CachedView> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted.elapsed() < self.ttl {
                self.hits.inc();
                return Some(entry.view.clone());
            }
        }
        // Expired entries are dropped lazily
        self.entries
            .remove_if(key, |_, entry| entry.inserted.elapsed() >= self.ttl);
        self.misses.inc();
        None
    }

    /// Memoize a projection
    pub fn put(&self, key: CacheKey, view: CachedView) {
        self.entries.insert(
            key,
            Entry {
                view,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every entry in a group
    pub fn invalidate_group(&self, group: CacheGroup) {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.group() != group);
        // saturating: concurrent inserts can land between the two reads
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            self.evictions.inc_by(dropped as u64);
            tracing::debug!(?group, dropped, "Cache group invalidated");
        }
    }

    /// Drop the detail entry for one property
    pub fn invalidate_detail(&self, property_id: Uuid) {
        if self
            .entries
            .remove(&CacheKey::PropertyDetail { id: property_id })
            .is_some()
        {
            self.evictions.inc();
        }
    }

    /// Conservative eviction for any mutation touching a property:
    /// both list groups in full plus that property's detail entry
    pub fn invalidate_for_property(&self, property_id: Uuid) {
        self.invalidate_group(CacheGroup::ListingPage);
        self.invalidate_group(CacheGroup::SearchResults);
        self.invalidate_detail(property_id);
    }

    /// Drop everything
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.evictions.inc_by(dropped as u64);
    }

    /// Current entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ListingCacheHook for ReadModelCache {
    fn property_changed(&self, property_id: Uuid) {
        self.invalidate_for_property(property_id);
    }
}
