//! Entity Kind - the discriminator between record types
//!
//! TigerStyle: closed set, explicit names, no runtime type inspection.

use serde::{Deserialize, Serialize};

/// Discriminator for every record type the storage layer knows about.
///
/// Variants are declared alphabetically. Both backends list entities of
/// several kinds in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Something a place offers (wifi, pool, ...)
    Amenity,
    /// A city inside a state
    City,
    /// A rental listing
    Place,
    /// A user's review of a place
    Review,
    /// A state owning cities
    State,
    /// An account owning places and reviews
    User,
}

impl EntityKind {
    /// Class name, used as the `__class__` discriminator and key prefix.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amenity => "Amenity",
            Self::City => "City",
            Self::Place => "Place",
            Self::Review => "Review",
            Self::State => "State",
            Self::User => "User",
        }
    }

    /// Parse a class name. Exact match only.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Amenity" => Some(Self::Amenity),
            "City" => Some(Self::City),
            "Place" => Some(Self::Place),
            "Review" => Some(Self::Review),
            "State" => Some(Self::State),
            "User" => Some(Self::User),
            _ => None,
        }
    }

    /// Plural collection name; doubles as the relational table name.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Amenity => "amenities",
            Self::City => "cities",
            Self::Place => "places",
            Self::Review => "reviews",
            Self::State => "states",
            Self::User => "users",
        }
    }

    /// Fields a client may change after creation.
    ///
    /// Identifiers, timestamps and foreign keys are never on this list.
    #[must_use]
    pub fn mutable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Amenity | Self::City | Self::State => &["name"],
            Self::Place => &[
                "name",
                "description",
                "number_rooms",
                "number_bathrooms",
                "max_guest",
                "price_by_night",
                "latitude",
                "longitude",
            ],
            Self::Review => &["text"],
            Self::User => &["password", "first_name", "last_name"],
        }
    }

    /// All kinds in listing order.
    #[must_use]
    pub fn all() -> &'static [EntityKind] {
        &[
            Self::Amenity,
            Self::City,
            Self::Place,
            Self::Review,
            Self::State,
            Self::User,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
