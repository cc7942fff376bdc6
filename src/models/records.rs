//! Records - the six domain types
//!
//! TigerStyle: plain data, explicit fields, foreign keys as ids.

use serde::{Deserialize, Serialize};

use super::base::BaseModel;

/// A state. Owns zero or more cities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl State {
    /// Create a new state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            name: name.into(),
        }
    }
}

/// A city, belonging to exactly one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// Owning state
    #[serde(default)]
    pub state_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl City {
    /// Create a new city inside `state_id`.
    #[must_use]
    pub fn new(state_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            state_id: state_id.into(),
            name: name.into(),
        }
    }
}

/// Something a place can offer. Linked to places many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amenity {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl Amenity {
    /// Create a new amenity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            name: name.into(),
        }
    }
}

/// An account. Email is unique across users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// Login email
    #[serde(default)]
    pub email: String,
    /// Opaque credential, never sent to clients
    #[serde(default)]
    pub password: String,
    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    /// Create a new user.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            email: email.into(),
            password: password.into(),
            first_name: None,
            last_name: None,
        }
    }
}

/// A rental listing, owned by a user and located in a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// City the place is in
    #[serde(default)]
    pub city_id: String,
    /// Owner
    #[serde(default)]
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Bedrooms
    #[serde(default)]
    pub number_rooms: i64,
    /// Bathrooms
    #[serde(default)]
    pub number_bathrooms: i64,
    /// Guest capacity
    #[serde(default)]
    pub max_guest: i64,
    /// Nightly price
    #[serde(default)]
    pub price_by_night: i64,
    /// Latitude
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Linked amenities, sorted and unique
    #[serde(default)]
    pub amenity_ids: Vec<String>,
}

impl Place {
    /// Create a new place in `city_id` owned by `user_id`.
    #[must_use]
    pub fn new(city_id: impl Into<String>, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            city_id: city_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            number_rooms: 0,
            number_bathrooms: 0,
            max_guest: 0,
            price_by_night: 0,
            latitude: None,
            longitude: None,
            amenity_ids: Vec::new(),
        }
    }

    /// Link an amenity. Returns false if it was already linked.
    pub fn link_amenity(&mut self, amenity_id: impl Into<String>) -> bool {
        let amenity_id = amenity_id.into();
        match self.amenity_ids.binary_search(&amenity_id) {
            Ok(_) => false,
            Err(pos) => {
                self.amenity_ids.insert(pos, amenity_id);
                true
            }
        }
    }

    /// Unlink an amenity. Returns false if it was not linked.
    pub fn unlink_amenity(&mut self, amenity_id: &str) -> bool {
        let len_before = self.amenity_ids.len();
        self.amenity_ids.retain(|id| id != amenity_id);
        self.amenity_ids.len() < len_before
    }

    /// Whether every id in `wanted` is linked.
    #[must_use]
    pub fn has_amenities(&self, wanted: &[String]) -> bool {
        wanted
            .iter()
            .all(|id| self.amenity_ids.binary_search(id).is_ok())
    }

    /// Restore the sorted/unique invariant after bulk assignment.
    pub(crate) fn normalize_amenities(&mut self) {
        self.amenity_ids.sort_unstable();
        self.amenity_ids.dedup();
    }
}

/// A user's review of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Identity and timestamps
    #[serde(flatten)]
    pub base: BaseModel,
    /// Reviewed place
    #[serde(default)]
    pub place_id: String,
    /// Author
    #[serde(default)]
    pub user_id: String,
    /// Review body
    #[serde(default)]
    pub text: String,
}

impl Review {
    /// Create a new review.
    #[must_use]
    pub fn new(place_id: impl Into<String>, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            base: BaseModel::new(),
            place_id: place_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }
}
