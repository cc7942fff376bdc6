//! Place routes: per-city listing, CRUD and search.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::{entity_json, json_object, ApiError, ApiResult, AppState};
use crate::models::{Entity, EntityKind};
use crate::search::{search_places, PlaceSearch};
use crate::storage::Storage;

const MISSING_USER_ID: &str = "Missing user_id";
const MISSING_NAME: &str = "Missing name";

async fn require(storage: &dyn Storage, kind: EntityKind, id: &str) -> ApiResult<Entity> {
    storage.get(kind, id).await?.ok_or(ApiError::NotFound)
}

/// `GET /cities/:city_id/places`
pub async fn list_city_places(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .with_session(|storage| async move {
            require(storage.as_ref(), EntityKind::City, &city_id).await?;
            let places = storage
                .places_of_city(&city_id)
                .await?
                .into_iter()
                .map(|place| entity_json(&Entity::from(place)))
                .collect();
            Ok::<_, ApiError>(Json(Value::Array(places)))
        })
        .await
}

/// `POST /cities/:city_id/places`
pub async fn create_place(
    State(state): State<AppState>,
    Path(city_id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state
        .with_session(|storage| async move {
            require(storage.as_ref(), EntityKind::City, &city_id).await?;

            let mut attributes = json_object(&body)?;
            match attributes.get("user_id") {
                None | Some(Value::Null) => return Err(ApiError::bad_request(MISSING_USER_ID)),
                // A non-string id cannot name any user.
                Some(Value::String(user_id)) => {
                    require(storage.as_ref(), EntityKind::User, user_id).await?;
                }
                Some(_) => return Err(ApiError::NotFound),
            }
            if attributes.get("name").filter(|name| !name.is_null()).is_none() {
                return Err(ApiError::bad_request(MISSING_NAME));
            }

            attributes.insert("city_id".to_string(), Value::String(city_id));
            let place = Entity::new_from_attributes(EntityKind::Place, &attributes)?;
            storage.add(place.clone()).await?;
            storage.save().await?;

            tracing::info!(place_id = %place.id(), "created place");
            Ok::<_, ApiError>((StatusCode::CREATED, Json(entity_json(&place))))
        })
        .await
}

/// `GET /places/:place_id`
pub async fn get_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .with_session(|storage| async move {
            let place = require(storage.as_ref(), EntityKind::Place, &place_id).await?;
            Ok::<_, ApiError>(Json(entity_json(&place)))
        })
        .await
}

/// `PUT /places/:place_id`: only the allow-listed fields change.
pub async fn update_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state
        .with_session(|storage| async move {
            let mut place = require(storage.as_ref(), EntityKind::Place, &place_id).await?;
            let attributes = json_object(&body)?;

            place.update(&attributes)?;
            storage.add(place.clone()).await?;
            storage.save().await?;
            Ok::<_, ApiError>(Json(entity_json(&place)))
        })
        .await
}

/// `DELETE /places/:place_id`
pub async fn delete_place(
    State(state): State<AppState>,
    Path(place_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .with_session(|storage| async move {
            let place = require(storage.as_ref(), EntityKind::Place, &place_id).await?;
            storage.delete(&place).await?;
            storage.save().await?;

            tracing::info!(place_id = %place_id, "deleted place");
            Ok::<_, ApiError>(Json(json!({})))
        })
        .await
}

/// `POST /places_search`
pub async fn search(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let attributes = json_object(&body)?;
    let filters: PlaceSearch = serde_json::from_value(Value::Object(attributes))
        .map_err(|e| ApiError::bad_request(format!("invalid search filters: {e}")))?;

    state
        .with_session(|storage| async move {
            let places = search_places(storage.as_ref(), &filters)
                .await?
                .into_iter()
                .map(|place| entity_json(&Entity::from(place)))
                .collect();
            Ok::<_, ApiError>(Json(Value::Array(places)))
        })
        .await
}
