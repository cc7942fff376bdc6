//! Models - Entity definitions and attribute-map conversions
//!
//! TigerStyle: one closed sum type over every record kind.
//!
//! # Attribute maps
//!
//! ```text
//! client JSON ──new_from_attributes──► Entity ──to_dict──► client JSON
//!                                        │  ▲
//!                          to_storage_dict│  │from_dict
//!                                        ▼  │
//!                                   storage JSON
//! ```
//!
//! `to_dict` carries a `__class__` discriminator and ISO-8601 timestamps
//! and drops the user password; `to_storage_dict` keeps everything.

mod base;
mod kind;
mod records;

use serde_json::{Map, Value};

pub use base::{new_id, now, timestamp, BaseModel, TIMESTAMP_FORMAT};
pub use kind::EntityKind;
pub use records::{Amenity, City, Place, Review, State, User};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Discriminator key in serialized attribute maps
pub const CLASS_KEY: &str = "__class__";

/// Keys a client can never set, on create or update
pub const RESERVED_KEYS: &[&str] = &[CLASS_KEY, "id", "created_at", "updated_at"];

/// Keys stripped from client-facing serialization
const PRIVATE_KEYS: &[&str] = &["password"];

// =============================================================================
// Errors
// =============================================================================

/// Errors building an entity from an attribute map.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("missing __class__ discriminator")]
    MissingKind,

    #[error("invalid {kind} attributes: {source}")]
    InvalidAttributes {
        kind: EntityKind,
        source: serde_json::Error,
    },
}

// =============================================================================
// Entity
// =============================================================================

/// Any stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Amenity(Amenity),
    City(City),
    Place(Place),
    Review(Review),
    State(State),
    User(User),
}

/// Dispatch an expression over the record inside an `Entity`.
macro_rules! with_record {
    ($entity:expr, $record:ident => $body:expr) => {
        match $entity {
            Entity::Amenity($record) => $body,
            Entity::City($record) => $body,
            Entity::Place($record) => $body,
            Entity::Review($record) => $body,
            Entity::State($record) => $body,
            Entity::User($record) => $body,
        }
    };
}

/// `From<Record> for Entity` plus a typed accessor per variant.
macro_rules! entity_variants {
    ($($variant:ident => $into:ident),* $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(record: $variant) -> Self {
                    Entity::$variant(record)
                }
            }
        )*

        impl Entity {
            $(
                #[doc = concat!("Unwrap into a `", stringify!($variant), "` if that is the kind.")]
                #[must_use]
                pub fn $into(self) -> Option<$variant> {
                    match self {
                        Entity::$variant(record) => Some(record),
                        _ => None,
                    }
                }
            )*
        }
    };
}

entity_variants! {
    Amenity => into_amenity,
    City => into_city,
    Place => into_place,
    Review => into_review,
    State => into_state,
    User => into_user,
}

impl Entity {
    /// Kind discriminator.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Amenity(_) => EntityKind::Amenity,
            Self::City(_) => EntityKind::City,
            Self::Place(_) => EntityKind::Place,
            Self::Review(_) => EntityKind::Review,
            Self::State(_) => EntityKind::State,
            Self::User(_) => EntityKind::User,
        }
    }

    /// Identity and timestamps.
    #[must_use]
    pub fn base(&self) -> &BaseModel {
        with_record!(self, record => &record.base)
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        with_record!(self, record => &mut record.base)
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Composite `"<Kind>.<id>"` key used by the file store.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.kind(), self.id())
    }

    /// Refresh `updated_at`. Call before re-adding a mutated entity.
    pub fn touch(&mut self) {
        self.base_mut().touch();
    }

    /// Foreign keys held by this record, as `(referenced kind, id)`.
    #[must_use]
    pub fn foreign_keys(&self) -> Vec<(EntityKind, &str)> {
        match self {
            Self::Amenity(_) | Self::State(_) | Self::User(_) => Vec::new(),
            Self::City(city) => vec![(EntityKind::State, city.state_id.as_str())],
            Self::Place(place) => vec![
                (EntityKind::City, place.city_id.as_str()),
                (EntityKind::User, place.user_id.as_str()),
            ],
            Self::Review(review) => vec![
                (EntityKind::Place, review.place_id.as_str()),
                (EntityKind::User, review.user_id.as_str()),
            ],
        }
    }

    /// Whether this record points at `(kind, id)` through a foreign key.
    #[must_use]
    pub fn references(&self, kind: EntityKind, id: &str) -> bool {
        self.foreign_keys()
            .iter()
            .any(|(fk_kind, fk_id)| *fk_kind == kind && *fk_id == id)
    }

    // =========================================================================
    // Attribute maps
    // =========================================================================

    /// Full attribute map, password included. Used for persistence.
    #[must_use]
    pub fn to_storage_dict(&self) -> Map<String, Value> {
        let value = with_record!(self, record => serde_json::to_value(record));
        let mut map = match value {
            Ok(Value::Object(map)) => map,
            // Records are structs of strings, integers, floats and lists.
            _ => unreachable!("records always serialize to a JSON object"),
        };
        map.insert(
            CLASS_KEY.to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        map
    }

    /// Client-facing attribute map.
    #[must_use]
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut map = self.to_storage_dict();
        for key in PRIVATE_KEYS {
            map.remove(*key);
        }
        map
    }

    /// Rebuild an entity of `kind` from a stored attribute map.
    ///
    /// Honors `id` and timestamps when present; missing ones are generated.
    /// Unknown keys are ignored.
    ///
    /// # Errors
    /// Returns `InvalidAttributes` when a known field has the wrong type.
    pub fn from_dict(kind: EntityKind, attributes: &Map<String, Value>) -> Result<Self, ModelError> {
        let mut attributes = attributes.clone();
        attributes.remove(CLASS_KEY);
        let value = Value::Object(attributes);

        let invalid = |source| ModelError::InvalidAttributes { kind, source };
        let entity = match kind {
            EntityKind::Amenity => Self::Amenity(serde_json::from_value(value).map_err(invalid)?),
            EntityKind::City => Self::City(serde_json::from_value(value).map_err(invalid)?),
            EntityKind::Place => {
                let mut place: Place = serde_json::from_value(value).map_err(invalid)?;
                place.normalize_amenities();
                Self::Place(place)
            }
            EntityKind::Review => Self::Review(serde_json::from_value(value).map_err(invalid)?),
            EntityKind::State => Self::State(serde_json::from_value(value).map_err(invalid)?),
            EntityKind::User => Self::User(serde_json::from_value(value).map_err(invalid)?),
        };

        Ok(entity)
    }

    /// Rebuild an entity whose kind is named by its `__class__` key.
    ///
    /// # Errors
    /// Returns `MissingKind`/`UnknownKind` for a bad discriminator, or
    /// `InvalidAttributes` as [`Entity::from_dict`].
    pub fn from_storage_dict(attributes: &Map<String, Value>) -> Result<Self, ModelError> {
        let class = attributes
            .get(CLASS_KEY)
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingKind)?;
        let kind =
            EntityKind::from_name(class).ok_or_else(|| ModelError::UnknownKind(class.to_string()))?;
        Self::from_dict(kind, attributes)
    }

    /// Construct a brand-new entity from a client payload.
    ///
    /// Any `id`, `created_at`, `updated_at` or `__class__` in the payload is
    /// ignored: the entity gets a fresh id and equal creation/update stamps.
    ///
    /// # Errors
    /// Returns `InvalidAttributes` when a known field has the wrong type.
    pub fn new_from_attributes(
        kind: EntityKind,
        attributes: &Map<String, Value>,
    ) -> Result<Self, ModelError> {
        let mut attributes = attributes.clone();
        for key in RESERVED_KEYS {
            attributes.remove(*key);
        }

        let mut entity = Self::from_dict(kind, &attributes)?;
        let base = entity.base_mut();
        base.updated_at = base.created_at;
        Ok(entity)
    }

    /// Apply a client update restricted to the kind's mutable fields.
    ///
    /// Keys outside the allow-list are skipped. On success `updated_at` is
    /// refreshed; on error the entity is left untouched.
    ///
    /// # Errors
    /// Returns `InvalidAttributes` when an allowed field has the wrong type.
    pub fn update(&mut self, attributes: &Map<String, Value>) -> Result<(), ModelError> {
        let kind = self.kind();
        let allowed = kind.mutable_fields();

        let mut current = self.to_storage_dict();
        for (key, value) in attributes {
            if allowed.contains(&key.as_str()) {
                current.insert(key.clone(), value.clone());
            } else {
                tracing::debug!(kind = %kind, key = %key, "ignoring non-updatable attribute");
            }
        }

        let mut updated = Self::from_dict(kind, &current)?;
        updated.touch();
        *self = updated;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_to_dict_shape() {
        let mut place = Place::new("city-1", "user-1", "Loft");
        place.number_rooms = 3;
        place.link_amenity("wifi");
        let entity = Entity::from(place.clone());

        let dict = entity.to_dict();
        assert_eq!(dict[CLASS_KEY], "Place");
        assert_eq!(dict["id"], place.base.id.as_str());
        assert_eq!(dict["city_id"], "city-1");
        assert_eq!(dict["number_rooms"], 3);
        assert_eq!(dict["amenity_ids"], json!(["wifi"]));

        let created = dict["created_at"].as_str().unwrap();
        assert_eq!(timestamp::parse(created), Some(place.base.created_at));
    }

    #[test]
    fn test_to_dict_hides_password() {
        let entity = Entity::from(User::new("a@b.c", "hunter2"));
        assert!(!entity.to_dict().contains_key("password"));
        assert_eq!(entity.to_storage_dict()["password"], "hunter2");
    }

    #[test]
    fn test_storage_dict_roundtrip() {
        let mut user = User::new("a@b.c", "pw");
        user.first_name = Some("Ada".to_string());
        let entity = Entity::from(user);

        let restored = Entity::from_storage_dict(&entity.to_storage_dict()).unwrap();
        assert_eq!(restored, entity);
    }

    #[test]
    fn test_from_storage_dict_rejects_bad_class() {
        let missing = object(json!({"id": "x"}));
        assert!(matches!(
            Entity::from_storage_dict(&missing),
            Err(ModelError::MissingKind)
        ));

        let unknown = object(json!({"__class__": "Spaceship", "id": "x"}));
        assert!(matches!(
            Entity::from_storage_dict(&unknown),
            Err(ModelError::UnknownKind(name)) if name == "Spaceship"
        ));
    }

    #[test]
    fn test_new_from_attributes_ignores_identity_and_timestamps() {
        let attrs = object(json!({
            "id": "chosen-by-client",
            "created_at": "2001-01-01T00:00:00",
            "updated_at": "2001-01-01T00:00:00",
            "name": "Nevada",
            "favorite_color": "teal",
        }));

        let entity = Entity::new_from_attributes(EntityKind::State, &attrs).unwrap();
        assert_ne!(entity.id(), "chosen-by-client");
        assert_eq!(entity.base().created_at, entity.base().updated_at);
        assert!(entity.base().created_at.timestamp() > 978_307_200);

        let state = entity.into_state().unwrap();
        assert_eq!(state.name, "Nevada");
    }

    #[test]
    fn test_new_from_attributes_rejects_wrong_types() {
        let attrs = object(json!({"city_id": "c", "user_id": "u", "name": "x", "max_guest": "many"}));
        let result = Entity::new_from_attributes(EntityKind::Place, &attrs);
        assert!(matches!(
            result,
            Err(ModelError::InvalidAttributes { kind: EntityKind::Place, .. })
        ));
    }

    #[test]
    fn test_from_dict_normalizes_amenities() {
        let attrs = object(json!({"amenity_ids": ["b", "a", "b"]}));
        let place = Entity::from_dict(EntityKind::Place, &attrs)
            .unwrap()
            .into_place()
            .unwrap();
        assert_eq!(place.amenity_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_update_respects_allow_list() {
        let place = Place::new("city-1", "user-1", "Loft");
        let original_id = place.base.id.clone();
        let created_at = place.base.created_at;
        let mut entity = Entity::from(place);

        std::thread::sleep(std::time::Duration::from_millis(2));
        let attrs = object(json!({
            "id": "hijack",
            "city_id": "elsewhere",
            "user_id": "someone-else",
            "created_at": "2001-01-01T00:00:00",
            "name": "Penthouse",
            "price_by_night": 250,
        }));
        entity.update(&attrs).unwrap();

        assert_eq!(entity.id(), original_id);
        assert_eq!(entity.base().created_at, created_at);
        assert!(entity.base().updated_at > created_at);

        let place = entity.into_place().unwrap();
        assert_eq!(place.city_id, "city-1");
        assert_eq!(place.user_id, "user-1");
        assert_eq!(place.name, "Penthouse");
        assert_eq!(place.price_by_night, 250);
    }

    #[test]
    fn test_update_failure_leaves_entity_untouched() {
        let mut entity = Entity::from(Review::new("p", "u", "Great"));
        let before = entity.clone();

        let attrs = object(json!({"text": 42}));
        assert!(entity.update(&attrs).is_err());
        assert_eq!(entity, before);
    }

    #[test]
    fn test_foreign_keys() {
        let review = Entity::from(Review::new("place-1", "user-1", "ok"));
        assert!(review.references(EntityKind::Place, "place-1"));
        assert!(review.references(EntityKind::User, "user-1"));
        assert!(!review.references(EntityKind::City, "place-1"));

        let state = Entity::from(State::new("Texas"));
        assert!(state.foreign_keys().is_empty());
    }

    #[test]
    fn test_key_format() {
        let amenity = Amenity::new("Wifi");
        let id = amenity.base.id.clone();
        assert_eq!(Entity::from(amenity).key(), format!("Amenity.{id}"));
    }
}
