//! REST API - thin HTTP facade over the storage engine
//!
//! TigerStyle: every handler runs inside one request-scoped storage handle,
//! closed exactly once whatever the outcome.
//!
//! Routes live under `/api/v1`:
//!
//! ```text
//! GET    /status
//! GET    /stats
//! GET    /cities/:city_id/places
//! POST   /cities/:city_id/places
//! GET    /places/:place_id
//! PUT    /places/:place_id
//! DELETE /places/:place_id
//! POST   /places_search
//! ```

mod index;
mod places;

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::{Entity, ModelError};
use crate::storage::{Storage, StorageEngine, StorageError};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Prefix for every route
pub const API_PREFIX: &str = "/api/v1";

/// Body of a 400 for a payload that is not a JSON object
const NOT_A_JSON_MESSAGE: &str = "Not a JSON";

// =============================================================================
// State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<StorageEngine>,
}

impl AppState {
    /// Wrap the process-wide engine.
    #[must_use]
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Run `work` against a fresh request-scoped handle, then close it.
    ///
    /// A close failure is logged and swallowed so it never masks the
    /// response already produced.
    async fn with_session<T, F, Fut>(&self, work: F) -> ApiResult<T>
    where
        F: FnOnce(Arc<dyn Storage>) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let storage = self.engine.session();
        let result = work(Arc::clone(&storage)).await;
        if let Err(e) = storage.close().await {
            tracing::warn!(error = %e, "failed to close storage session");
        }
        result
    }
}

/// Build the router with every route under [`API_PREFIX`].
pub fn router(engine: Arc<StorageEngine>) -> Router {
    let api = Router::new()
        .route("/status", get(index::status))
        .route("/stats", get(index::stats))
        .route(
            "/cities/:city_id/places",
            get(places::list_city_places).post(places::create_place),
        )
        .route(
            "/places/:place_id",
            get(places::get_place)
                .put(places::update_place)
                .delete(places::delete_place),
        )
        .route("/places_search", post(places::search));

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(not_found)
        .with_state(AppState::new(engine))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

// =============================================================================
// Errors
// =============================================================================

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if err.is_backend_failure() {
            Self::Storage(err)
        } else {
            Self::Conflict(err.to_string())
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(err) => {
                tracing::error!(error = %err, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a request body that must be a JSON object.
fn json_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::bad_request(NOT_A_JSON_MESSAGE)),
    }
}

/// Client-facing JSON for one entity.
fn entity_json(entity: &Entity) -> Value {
    Value::Object(entity.to_dict())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_object_accepts_only_objects() {
        assert!(json_object(&Bytes::from_static(br#"{"name": "x"}"#)).is_ok());

        for body in [&b"[1, 2]"[..], b"\"text\"", b"not json", b""] {
            let err = json_object(&Bytes::copy_from_slice(body)).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(msg) if msg == NOT_A_JSON_MESSAGE));
        }
    }

    #[test]
    fn test_storage_errors_split_by_kind() {
        let err: ApiError = StorageError::constraint("email taken").into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError = StorageError::io("disk full").into();
        assert!(matches!(err, ApiError::Storage(_)));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::bad_request("Missing name").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Storage(StorageError::query("commit failed"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
