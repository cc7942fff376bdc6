//! Search - Place lookup by state, city and amenity filters
//!
//! TigerStyle: resolve ids, skip what does not resolve, never fail on
//! dangling references.
//!
//! # Pipeline
//!
//! ```text
//! states ──cities_of_state──┐
//!                           ├─► candidate cities (dedup by id)
//! cities ──get(City)────────┘            │
//!                                        ▼
//!                              candidate places ──amenity superset──► result
//! ```
//!
//! The two backends expose place amenities in different shapes (linked
//! records vs. a raw id list), so the amenity step branches on
//! [`Storage::kind`].

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};

use crate::models::{City, Entity, EntityKind, Place};
use crate::storage::{Storage, StorageKind, StorageResult};

/// Optional filters for [`search_places`]. Absent, `null` and empty lists
/// all mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlaceSearch {
    /// State ids
    #[serde(default, deserialize_with = "null_as_empty")]
    pub states: Vec<String>,
    /// City ids
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cities: Vec<String>,
    /// Amenity ids; a place must have all of them
    #[serde(default, deserialize_with = "null_as_empty")]
    pub amenities: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlaceSearch {
    /// No filters at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add state filters.
    #[must_use]
    pub fn with_states<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add city filters.
    #[must_use]
    pub fn with_cities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cities.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add amenity filters.
    #[must_use]
    pub fn with_amenities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.amenities.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Whether every filter is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.cities.is_empty() && self.amenities.is_empty()
    }

    fn has_location(&self) -> bool {
        !self.states.is_empty() || !self.cities.is_empty()
    }
}

/// Find places matching `filters`.
///
/// With no filters every place is returned. Unknown state, city or amenity
/// ids never raise; an unknown amenity id simply matches nothing.
///
/// # Errors
/// Propagates backend failures only.
pub async fn search_places(storage: &dyn Storage, filters: &PlaceSearch) -> StorageResult<Vec<Place>> {
    if filters.is_empty() {
        return all_places(storage).await;
    }

    let candidates = if filters.has_location() {
        let cities = candidate_cities(storage, filters).await?;
        places_in_cities(storage, &cities).await?
    } else {
        all_places(storage).await?
    };

    if filters.amenities.is_empty() {
        return Ok(candidates);
    }

    let matched = match storage.kind() {
        StorageKind::Db => filter_by_linked_amenities(storage, candidates, &filters.amenities).await?,
        StorageKind::File => candidates
            .into_iter()
            .filter(|place| place.has_amenities(&filters.amenities))
            .collect(),
    };

    tracing::debug!(
        states = filters.states.len(),
        cities = filters.cities.len(),
        amenities = filters.amenities.len(),
        results = matched.len(),
        "place search"
    );
    Ok(matched)
}

async fn all_places(storage: &dyn Storage) -> StorageResult<Vec<Place>> {
    Ok(storage
        .all(Some(EntityKind::Place))
        .await?
        .into_iter()
        .filter_map(Entity::into_place)
        .collect())
}

/// Cities of the given states, then the given cities, without repeats.
async fn candidate_cities(storage: &dyn Storage, filters: &PlaceSearch) -> StorageResult<Vec<City>> {
    let mut seen = HashSet::new();
    let mut cities = Vec::new();

    for state_id in &filters.states {
        if storage.get(EntityKind::State, state_id).await?.is_none() {
            tracing::debug!(state_id = %state_id, "search skipping unknown state");
            continue;
        }
        for city in storage.cities_of_state(state_id).await? {
            if seen.insert(city.base.id.clone()) {
                cities.push(city);
            }
        }
    }

    for city_id in &filters.cities {
        if seen.contains(city_id) {
            continue;
        }
        match storage.get(EntityKind::City, city_id).await?.and_then(Entity::into_city) {
            Some(city) => {
                seen.insert(city.base.id.clone());
                cities.push(city);
            }
            None => tracing::debug!(city_id = %city_id, "search skipping unknown city"),
        }
    }

    Ok(cities)
}

/// Places of each city, in city order.
async fn places_in_cities(storage: &dyn Storage, cities: &[City]) -> StorageResult<Vec<Place>> {
    let mut places = Vec::new();
    match storage.kind() {
        StorageKind::Db => {
            for city in cities {
                places.extend(storage.places_of_city(&city.base.id).await?);
            }
        }
        StorageKind::File => {
            // One scan of every place instead of one per city.
            let all = all_places(storage).await?;
            for city in cities {
                places.extend(all.iter().filter(|place| place.city_id == city.base.id).cloned());
            }
        }
    }
    Ok(places)
}

/// Keep places whose linked amenity records include every requested one.
async fn filter_by_linked_amenities(
    storage: &dyn Storage,
    candidates: Vec<Place>,
    amenity_ids: &[String],
) -> StorageResult<Vec<Place>> {
    let mut wanted = HashSet::new();
    for amenity_id in amenity_ids {
        match storage.get(EntityKind::Amenity, amenity_id).await? {
            Some(amenity) => {
                wanted.insert(amenity.id().to_string());
            }
            None => return Ok(Vec::new()),
        }
    }

    let mut matched = Vec::new();
    for place in candidates {
        let linked: HashSet<String> = storage
            .amenities_of_place(&place.base.id)
            .await?
            .into_iter()
            .map(|amenity| amenity.base.id)
            .collect();
        if wanted.is_subset(&linked) {
            matched.push(place);
        }
    }
    Ok(matched)
}
