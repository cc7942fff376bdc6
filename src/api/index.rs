//! Service status and per-kind counts.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Map, Value};

use super::{ApiError, ApiResult, AppState};
use crate::models::EntityKind;

/// `GET /status`
pub async fn status() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

/// `GET /stats`: entity count per collection name.
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state
        .with_session(|storage| async move {
            let mut counts = Map::new();
            for kind in EntityKind::all() {
                let count = storage.count(Some(*kind)).await?;
                counts.insert(kind.collection().to_string(), Value::from(count));
            }
            Ok::<_, ApiError>(Json(Value::Object(counts)))
        })
        .await
}
