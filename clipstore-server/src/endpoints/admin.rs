use axum::extract::State;
use axum::{Json, Router, routing};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extractors::JsonBody;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/admin", routing::get(admin_get).post(admin_post))
}

/// Response returned when storing an admin entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAdminResponse {
    inserted_id: Uuid,
}

async fn admin_post(
    State(state): State<ServiceState>,
    JsonBody(entry): JsonBody<Value>,
) -> ApiResult<Json<InsertAdminResponse>> {
    let inserted_id = state.admin.insert(entry).await?;
    Ok(Json(InsertAdminResponse { inserted_id }))
}

async fn admin_get(State(state): State<ServiceState>) -> ApiResult<Json<Option<Map<String, Value>>>> {
    Ok(Json(state.admin.first().await?))
}
