//! Storage Trait
//!
//! TigerStyle: Abstract interface for entity storage.
//!
//! Every backend must give identical answers to `get`, `all` and `count`
//! for equivalent data. Relationship traversal is an explicit method so the
//! cost (scan vs. join) stays visible at the call site.

use async_trait::async_trait;

use super::error::StorageResult;
use super::StorageKind;
use crate::models::{Amenity, City, Entity, EntityKind, Place, Review};

/// Abstract storage backend for entities.
///
/// TigerStyle: All operations are async, return explicit errors.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Which backend this is. Fixed for the lifetime of the process.
    fn kind(&self) -> StorageKind;

    /// Get an entity by kind and ID.
    ///
    /// Returns None if no such entity exists.
    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<Entity>>;

    /// Every entity of `kind`, or of every kind when `None`.
    ///
    /// Ordered by kind name, then id.
    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<Vec<Entity>>;

    /// Count entities with optional kind filter.
    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<usize>;

    /// Register a new or mutated entity.
    ///
    /// Visible to `get`/`all` immediately; durable only after `save`.
    async fn add(&self, entity: Entity) -> StorageResult<()>;

    /// Remove an entity and its dependents.
    ///
    /// Deleting an absent entity is a no-op.
    async fn delete(&self, entity: &Entity) -> StorageResult<()>;

    /// Durably commit the live set.
    async fn save(&self) -> StorageResult<()>;

    /// (Re)initialize from durable storage, creating schema if needed.
    async fn reload(&self) -> StorageResult<()>;

    /// Release resources held by this handle.
    async fn close(&self) -> StorageResult<()>;

    /// Cities belonging to a state.
    async fn cities_of_state(&self, state_id: &str) -> StorageResult<Vec<City>>;

    /// Places located in a city.
    async fn places_of_city(&self, city_id: &str) -> StorageResult<Vec<Place>>;

    /// Amenities linked to a place.
    async fn amenities_of_place(&self, place_id: &str) -> StorageResult<Vec<Amenity>>;

    /// Reviews of a place.
    async fn reviews_of_place(&self, place_id: &str) -> StorageResult<Vec<Review>>;
}
