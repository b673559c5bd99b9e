//! Likes and comments on video records.

use axum::extract::State;
use axum::{Json, Router, routing};
use clipstore_service::id::RecordId;
use serde::Deserialize;

use crate::endpoints::common::{CommentBody, LikeBody, VideoResponse, require};
use crate::error::ApiResult;
use crate::extractors::{JsonBody, Xt};
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route(
            "/videoDetails/{record_id}/likes",
            routing::post(like_add).delete(like_remove),
        )
        .route("/videoDetails/{record_id}/comments", routing::post(comment_add))
}

/// Identifies the like to remove.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlikeBody {
    #[serde(default)]
    user_email: String,
}

async fn like_add(
    State(state): State<ServiceState>,
    Xt(id): Xt<RecordId>,
    JsonBody(body): JsonBody<LikeBody>,
) -> ApiResult<Json<VideoResponse>> {
    let like = body.into_like()?;
    let record = state
        .gateway
        .records()
        .add_like(&id, &like.user_email, &like.user_name)
        .await?;

    tracing::debug!(record_id = %id, likes = record.likes.len(), "like added");
    Ok(Json(VideoResponse::new(&state, record)))
}

async fn like_remove(
    State(state): State<ServiceState>,
    Xt(id): Xt<RecordId>,
    JsonBody(body): JsonBody<UnlikeBody>,
) -> ApiResult<Json<VideoResponse>> {
    let user_email = require("userEmail", body.user_email)?;
    let record = state.gateway.records().remove_like(&id, &user_email).await?;

    tracing::debug!(record_id = %id, likes = record.likes.len(), "like removed");
    Ok(Json(VideoResponse::new(&state, record)))
}

async fn comment_add(
    State(state): State<ServiceState>,
    Xt(id): Xt<RecordId>,
    JsonBody(body): JsonBody<CommentBody>,
) -> ApiResult<Json<VideoResponse>> {
    let comment = body.into_comment()?;
    let record = state.gateway.records().add_comment(&id, comment).await?;

    tracing::debug!(record_id = %id, comments = record.comments.len(), "comment added");
    Ok(Json(VideoResponse::new(&state, record)))
}
