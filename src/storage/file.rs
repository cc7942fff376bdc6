//! FileStorage - JSON File Backend
//!
//! TigerStyle: In-memory object table, flushed whole to one file.
//!
//! # Layout
//!
//! ```text
//! {
//!   "State.<id>": { "__class__": "State", "id": "<id>", ... },
//!   "City.<id>":  { "__class__": "City", "state_id": "<id>", ... }
//! }
//! ```
//!
//! Relationships are resolved by scanning foreign-key fields; there is no
//! index. One mutex serializes every mutation and the read-serialize-write
//! cycle of `save`, so concurrent requests never lose an update.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use super::StorageKind;
use crate::models::{Amenity, City, Entity, EntityKind, Place, Review};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Suffix of the scratch file written before the atomic rename
const TEMP_FILE_SUFFIX: &str = ".tmp";

type ObjectTable = BTreeMap<String, Entity>;

fn object_key(kind: EntityKind, id: &str) -> String {
    format!("{kind}.{id}")
}

// =============================================================================
// FileStorage
// =============================================================================

/// File-backed storage.
///
/// Clones share the same object table, so every request-scoped handle sees
/// the same live set.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// JSON file holding the persisted table
    path: PathBuf,
    /// Live objects keyed by `"<Kind>.<id>"`
    objects: Arc<Mutex<ObjectTable>>,
}

impl FileStorage {
    /// Create an empty store bound to `path`. Call `reload` to load it.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Create and load a store.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or decoded.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let storage = Self::new(path);
        storage.reload().await?;
        Ok(storage)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(TEMP_FILE_SUFFIX);
        PathBuf::from(name)
    }

    /// Read and decode the backing file. Missing file means empty table.
    async fn read_table(&self) -> StorageResult<Option<ObjectTable>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::io(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let raw: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::Deserialization(format!("{}: {e}", self.path.display()))
        })?;

        let mut table = ObjectTable::new();
        for (key, value) in raw {
            let Value::Object(attributes) = value else {
                return Err(StorageError::Deserialization(format!(
                    "{key}: expected an object"
                )));
            };
            let entity = Entity::from_storage_dict(&attributes)
                .map_err(|e| StorageError::Deserialization(format!("{key}: {e}")))?;
            table.insert(entity.key(), entity);
        }
        Ok(Some(table))
    }
}

/// Remove `(kind, id)` and, transitively, everything that references it.
fn remove_cascading(objects: &mut ObjectTable, kind: EntityKind, id: &str) {
    if objects.remove(&object_key(kind, id)).is_none() {
        return;
    }

    let dependents: Vec<(EntityKind, String)> = objects
        .values()
        .filter(|entity| entity.references(kind, id))
        .map(|entity| (entity.kind(), entity.id().to_string()))
        .collect();
    for (dependent_kind, dependent_id) in dependents {
        remove_cascading(objects, dependent_kind, &dependent_id);
    }

    if kind == EntityKind::Amenity {
        for entity in objects.values_mut() {
            if let Entity::Place(place) = entity {
                place.unlink_amenity(id);
            }
        }
    }
}

fn records_of<T>(
    objects: &ObjectTable,
    extract: impl Fn(&Entity) -> Option<&T>,
) -> Vec<T>
where
    T: Clone,
{
    objects.values().filter_map(extract).cloned().collect()
}

// =============================================================================
// Storage Implementation
// =============================================================================

#[async_trait]
impl Storage for FileStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::File
    }

    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<Entity>> {
        let objects = self.objects.lock().await;
        Ok(objects.get(&object_key(kind, id)).cloned())
    }

    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<Vec<Entity>> {
        let objects = self.objects.lock().await;
        Ok(objects
            .values()
            .filter(|entity| kind.map_or(true, |k| entity.kind() == k))
            .cloned()
            .collect())
    }

    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<usize> {
        let objects = self.objects.lock().await;
        Ok(match kind {
            Some(kind) => objects.values().filter(|e| e.kind() == kind).count(),
            None => objects.len(),
        })
    }

    async fn add(&self, entity: Entity) -> StorageResult<()> {
        let mut objects = self.objects.lock().await;

        if let Entity::User(user) = &entity {
            let taken = objects.values().any(|other| match other {
                Entity::User(existing) => {
                    existing.email == user.email && existing.base.id != user.base.id
                }
                _ => false,
            });
            if taken {
                return Err(StorageError::constraint(format!(
                    "email already in use: {}",
                    user.email
                )));
            }
        }

        tracing::debug!(key = %entity.key(), "file storage add");
        objects.insert(entity.key(), entity);
        Ok(())
    }

    async fn delete(&self, entity: &Entity) -> StorageResult<()> {
        let mut objects = self.objects.lock().await;
        tracing::debug!(key = %entity.key(), "file storage delete");
        remove_cascading(&mut objects, entity.kind(), entity.id());
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        let objects = self.objects.lock().await;

        let table: Map<String, Value> = objects
            .iter()
            .map(|(key, entity)| (key.clone(), Value::Object(entity.to_storage_dict())))
            .collect();
        let bytes = serde_json::to_vec(&table)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("failed to create {}: {e}", parent.display())))?;
        }

        let temp_path = self.temp_path();
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| StorageError::io(format!("failed to write {}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(format!("failed to replace {}: {e}", self.path.display())))?;

        tracing::info!(path = %self.path.display(), objects = objects.len(), "Saved file storage");
        Ok(())
    }

    async fn reload(&self) -> StorageResult<()> {
        // Decode fully before touching the live table.
        let loaded = self.read_table().await?;

        let mut objects = self.objects.lock().await;
        match loaded {
            Some(table) => {
                *objects = table;
                tracing::info!(path = %self.path.display(), objects = objects.len(), "Loaded file storage");
            }
            None => {
                objects.clear();
                tracing::info!(path = %self.path.display(), "No storage file yet, starting empty");
            }
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        // The table is process-wide; nothing is held per handle.
        tracing::debug!("file storage handle closed");
        Ok(())
    }

    async fn cities_of_state(&self, state_id: &str) -> StorageResult<Vec<City>> {
        let objects = self.objects.lock().await;
        Ok(records_of(&objects, |entity| match entity {
            Entity::City(city) if city.state_id == state_id => Some(city),
            _ => None,
        }))
    }

    async fn places_of_city(&self, city_id: &str) -> StorageResult<Vec<Place>> {
        let objects = self.objects.lock().await;
        Ok(records_of(&objects, |entity| match entity {
            Entity::Place(place) if place.city_id == city_id => Some(place),
            _ => None,
        }))
    }

    async fn amenities_of_place(&self, place_id: &str) -> StorageResult<Vec<Amenity>> {
        let objects = self.objects.lock().await;
        let Some(Entity::Place(place)) = objects.get(&object_key(EntityKind::Place, place_id)) else {
            return Ok(Vec::new());
        };
        Ok(place
            .amenity_ids
            .iter()
            .filter_map(|id| match objects.get(&object_key(EntityKind::Amenity, id)) {
                Some(Entity::Amenity(amenity)) => Some(amenity.clone()),
                _ => None,
            })
            .collect())
    }

    async fn reviews_of_place(&self, place_id: &str) -> StorageResult<Vec<Review>> {
        let objects = self.objects.lock().await;
        Ok(records_of(&objects, |entity| match entity {
            Entity::Review(review) if review.place_id == place_id => Some(review),
            _ => None,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
