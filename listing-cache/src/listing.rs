//! Listing service: cached property projections and the mutations that
//! invalidate them
//!
//! Reads go cache-first; every mutation writes through the store and
//! evicts after the write, never before. Summaries carry no lazy
//! references, so nothing partially loaded leaves this module.

use crate::cache::{CacheGroup, CacheKey, CachedView, ReadModelCache, SearchFilter};
use crate::error::{Error, Result};
use booking_core::types::{Availability, Property, PropertyType, Purpose, User, UserRole};
use booking_core::Storage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Flat listing projection served from list and search pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySummary {
    /// Property id
    pub id: Uuid,
    /// Listing title
    pub title: String,
    /// Sale price
    pub price: Option<Decimal>,
    /// Monthly rent
    pub rent_amount: Option<Decimal>,
    /// City
    pub city: String,
    /// Locality within the city
    pub locality: String,
    /// Structural category
    pub property_type: PropertyType,
    /// Buy or rent
    pub purpose: Purpose,
    /// Marketplace visibility
    pub availability: Availability,
    /// Bedrooms
    pub bedrooms: Option<u16>,
    /// Bathrooms
    pub bathrooms: Option<u16>,
    /// Carpet area in square feet
    pub area_sqft: Option<u32>,
    /// Thumbnail image URL
    pub thumbnail: Option<String>,
    /// Passed manual verification
    pub verified: bool,
}

impl From<&Property> for PropertySummary {
    fn from(p: &Property) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            price: p.price,
            rent_amount: p.rent_amount,
            city: p.city.clone(),
            locality: p.locality.clone(),
            property_type: p.property_type,
            purpose: p.purpose,
            availability: p.availability,
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            area_sqft: p.area_sqft,
            thumbnail: p.image_url.clone(),
            verified: p.verified,
        }
    }
}

/// A property with its owner eagerly resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDetailView {
    /// The property row
    pub property: Property,
    /// Listing owner
    pub owner: User,
}

/// Mutable listing fields accepted by `update_property`
///
/// Ownership, buyer, and sold state are engine-managed and deliberately
/// absent here.
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdate {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New sale price
    pub price: Option<Decimal>,
    /// New monthly rent
    pub rent_amount: Option<Decimal>,
    /// New city
    pub city: Option<String>,
    /// New locality
    pub locality: Option<String>,
    /// New image URL
    pub image_url: Option<String>,
}

/// Cached listing/search/detail projections over the property store
pub struct ListingService {
    storage: Arc<Storage>,
    cache: Arc<ReadModelCache>,
}

impl ListingService {
    /// Build over a shared store and cache
    pub fn new(storage: Arc<Storage>, cache: Arc<ReadModelCache>) -> Self {
        Self { storage, cache }
    }

    /// The cache, for wiring as the engine's eviction hook
    pub fn cache(&self) -> Arc<ReadModelCache> {
        Arc::clone(&self.cache)
    }

    // Cached reads

    /// One page of verified listings, newest first
    pub fn page(&self, page: usize, size: usize) -> Result<Arc<Vec<PropertySummary>>> {
        let key = CacheKey::ListingPage { page, size };
        if let Some(CachedView::Summaries(summaries)) = self.cache.get(&key) {
            return Ok(summaries);
        }

        let mut properties: Vec<Property> = self
            .storage
            .list_properties()?
            .into_iter()
            .filter(|p| p.verified)
            .collect();
        properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let summaries = Arc::new(paginate(&properties, page, size));
        self.cache
            .put(key, CachedView::Summaries(Arc::clone(&summaries)));
        Ok(summaries)
    }

    /// One page of filtered search results, newest first
    pub fn search(
        &self,
        filter: &SearchFilter,
        page: usize,
        size: usize,
    ) -> Result<Arc<Vec<PropertySummary>>> {
        let key = CacheKey::Search {
            filter: filter.clone(),
            page,
            size,
        };
        if let Some(CachedView::Summaries(summaries)) = self.cache.get(&key) {
            return Ok(summaries);
        }

        let mut properties: Vec<Property> = self
            .storage
            .list_properties()?
            .into_iter()
            .filter(|p| p.verified && matches_filter(p, filter))
            .collect();
        properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let summaries = Arc::new(paginate(&properties, page, size));
        self.cache
            .put(key, CachedView::Summaries(Arc::clone(&summaries)));
        Ok(summaries)
    }

    /// One property with its owner resolved
    pub fn detail(&self, property_id: Uuid) -> Result<Arc<PropertyDetailView>> {
        let key = CacheKey::PropertyDetail { id: property_id };
        if let Some(CachedView::Detail(detail)) = self.cache.get(&key) {
            return Ok(detail);
        }

        let property = self.storage.get_property(property_id)?;
        let owner = self.storage.get_user(property.owner_id)?;
        let detail = Arc::new(PropertyDetailView { property, owner });
        self.cache.put(key, CachedView::Detail(Arc::clone(&detail)));
        Ok(detail)
    }

    /// Distinct cities across all listings
    pub fn cities(&self) -> Result<Arc<Vec<String>>> {
        if let Some(CachedView::Cities(cities)) = self.cache.get(&CacheKey::Cities) {
            return Ok(cities);
        }

        let cities = Arc::new(self.storage.cities()?);
        self.cache
            .put(CacheKey::Cities, CachedView::Cities(Arc::clone(&cities)));
        Ok(cities)
    }

    // Mutations (write, then evict)

    /// Create a listing for a builder; forced unverified pending review
    pub fn create_property(&self, owner_id: Uuid, mut property: Property) -> Result<Property> {
        let owner = self.storage.get_user(owner_id)?;
        if owner.role != UserRole::Builder {
            return Err(Error::NotABuilder(owner_id.to_string()));
        }

        property.owner_id = owner_id;
        property.verified = false;
        self.storage.put_property(&property)?;

        self.evict_lists();
        self.cache.invalidate_group(CacheGroup::CityList);
        tracing::info!(property_id = %property.id, city = %property.city, "Listing created");
        Ok(property)
    }

    /// Apply a field update to a listing
    pub fn update_property(&self, property_id: Uuid, update: PropertyUpdate) -> Result<Property> {
        let mut property = self.storage.get_property(property_id)?;

        let city_changed = update
            .city
            .as_ref()
            .map(|c| c != &property.city)
            .unwrap_or(false);

        if let Some(title) = update.title {
            property.title = title;
        }
        if let Some(description) = update.description {
            property.description = description;
        }
        if let Some(price) = update.price {
            property.price = Some(price);
        }
        if let Some(rent) = update.rent_amount {
            property.rent_amount = Some(rent);
        }
        if let Some(city) = update.city {
            property.city = city;
        }
        if let Some(locality) = update.locality {
            property.locality = locality;
        }
        if let Some(image_url) = update.image_url {
            property.image_url = Some(image_url);
        }

        self.storage.put_property(&property)?;

        self.evict_for(property_id);
        if city_changed {
            self.cache.invalidate_group(CacheGroup::CityList);
        }
        Ok(property)
    }

    /// Change marketplace visibility
    pub fn set_availability(
        &self,
        property_id: Uuid,
        availability: Availability,
    ) -> Result<Property> {
        let mut property = self.storage.get_property(property_id)?;
        property.availability = availability;
        self.storage.put_property(&property)?;

        self.evict_for(property_id);
        Ok(property)
    }

    /// Mark a listing as passed (or failed) manual verification
    pub fn set_verified(&self, property_id: Uuid, verified: bool) -> Result<Property> {
        let mut property = self.storage.get_property(property_id)?;
        property.verified = verified;
        self.storage.put_property(&property)?;

        self.evict_for(property_id);
        Ok(property)
    }

    /// Delete a listing and every dependent row, then evict
    pub fn delete_property(&self, property_id: Uuid) -> Result<()> {
        self.storage.delete_property_cascade(property_id)?;

        self.evict_for(property_id);
        self.cache.invalidate_group(CacheGroup::CityList);
        Ok(())
    }

    fn evict_lists(&self) {
        self.cache.invalidate_group(CacheGroup::ListingPage);
        self.cache.invalidate_group(CacheGroup::SearchResults);
    }

    fn evict_for(&self, property_id: Uuid) {
        self.cache.invalidate_for_property(property_id);
    }
}

fn paginate(properties: &[Property], page: usize, size: usize) -> Vec<PropertySummary> {
    properties
        .iter()
        .skip(page.saturating_mul(size))
        .take(size)
        .map(PropertySummary::from)
        .collect()
}

fn matches_filter(property: &Property, filter: &SearchFilter) -> bool {
    if let Some(purpose) = filter.purpose {
        if property.purpose != purpose {
            return false;
        }
    }
    if let Some(property_type) = filter.property_type {
        if property.property_type != property_type {
            return false;
        }
    }
    if let Some(ref city) = filter.city {
        if !property.city.eq_ignore_ascii_case(city) {
            return false;
        }
    }
    if let Some(ref locality) = filter.locality {
        if !property.locality.eq_ignore_ascii_case(locality) {
            return false;
        }
    }
    if let Some(availability) = filter.availability {
        if property.availability != availability {
            return false;
        }
    }
    if let Some(ref text) = filter.text {
        let needle = text.to_lowercase();
        let haystack = format!(
            "{} {} {} {}",
            property.title, property.description, property.city, property.locality
        )
        .to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::types::Occupancy;
    use booking_core::Config;
    use chrono::Utc;

    fn property(city: &str, purpose: Purpose) -> Property {
        Property {
            id: Uuid::now_v7(),
            title: format!("Listing in {}", city),
            description: "Spacious and bright".to_string(),
            city: city.to_string(),
            locality: "Central".to_string(),
            purpose,
            property_type: PropertyType::Apartment,
            price: Some(Decimal::from(1_000_000)),
            rent_amount: Some(Decimal::from(10_000)),
            bedrooms: Some(2),
            bathrooms: Some(1),
            area_sqft: Some(900),
            availability: Availability::Available,
            occupancy: Occupancy::Vacant,
            owner_id: Uuid::now_v7(),
            buyer_id: None,
            sold_at: None,
            verified: true,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn service() -> (ListingService, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        let cache = Arc::new(ReadModelCache::new(Default::default()).unwrap());
        (ListingService::new(storage, cache), dir)
    }

    #[test]
    fn test_filter_matching() {
        let p = property("Pune", Purpose::Buy);

        assert!(matches_filter(&p, &SearchFilter::default()));
        assert!(matches_filter(
            &p,
            &SearchFilter {
                city: Some("pune".to_string()),
                ..Default::default()
            }
        ));
        assert!(!matches_filter(
            &p,
            &SearchFilter {
                purpose: Some(Purpose::Rent),
                ..Default::default()
            }
        ));
        assert!(matches_filter(
            &p,
            &SearchFilter {
                text: Some("spacious".to_string()),
                ..Default::default()
            }
        ));
        assert!(!matches_filter(
            &p,
            &SearchFilter {
                text: Some("penthouse".to_string()),
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_page_excludes_unverified() {
        let (service, _dir) = service();
        let storage = Arc::clone(&service.storage);

        let verified = property("Pune", Purpose::Buy);
        storage.put_property(&verified).unwrap();
        let mut unverified = property("Pune", Purpose::Buy);
        unverified.verified = false;
        storage.put_property(&unverified).unwrap();

        let page = service.page(0, 20).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, verified.id);
    }

    #[test]
    fn test_create_requires_builder() {
        let (service, _dir) = service();
        let storage = Arc::clone(&service.storage);

        let customer = User {
            id: Uuid::now_v7(),
            full_name: "Meera".to_string(),
            email: "meera@example.com".to_string(),
            role: UserRole::Customer,
        };
        storage.put_user(&customer).unwrap();

        let result = service.create_property(customer.id, property("Pune", Purpose::Buy));
        assert!(matches!(result, Err(Error::NotABuilder(_))));
    }

    #[test]
    fn test_create_forces_unverified() {
        let (service, _dir) = service();
        let storage = Arc::clone(&service.storage);

        let builder = User {
            id: Uuid::now_v7(),
            full_name: "Sanjay".to_string(),
            email: "sanjay@example.com".to_string(),
            role: UserRole::Builder,
        };
        storage.put_user(&builder).unwrap();

        let created = service
            .create_property(builder.id, property("Nashik", Purpose::Buy))
            .unwrap();
        assert!(!created.verified);
        assert_eq!(created.owner_id, builder.id);
    }

    #[test]
    fn test_pagination_bounds() {
        let (service, _dir) = service();
        let storage = Arc::clone(&service.storage);
        for _ in 0..5 {
            storage.put_property(&property("Pune", Purpose::Buy)).unwrap();
        }

        assert_eq!(service.page(0, 2).unwrap().len(), 2);
        assert_eq!(service.page(2, 2).unwrap().len(), 1);
        assert_eq!(service.page(3, 2).unwrap().len(), 0);
    }
}
