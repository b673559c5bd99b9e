//! Uploading, listing, streaming and deleting videos.

use std::io;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use clipstore_service::gateway::StagedUpload;
use clipstore_service::id::{ObjectId, RecordId};
use clipstore_service::records::{Comment, Like, VideoFields};
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;

use crate::endpoints::common::{CommentBody, LikeBody, VideoResponse, require};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{FILE_FIELD, FormData, RangeHeader, Xt};
use crate::state::ServiceState;

/// Content type of videos uploaded without one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route(
            "/videoDetails",
            routing::get(videos_list).post(video_upload),
        )
        .route(
            "/videoDetails/{record_id}",
            routing::get(video_get).delete(video_delete),
        )
        .route("/videos/{object_id}", routing::get(video_stream))
}

/// Text fields of an upload form, collected in whatever order they arrive.
#[derive(Debug, Default)]
struct UploadForm {
    title: Option<String>,
    description: Option<String>,
    uploader_name: Option<String>,
    uploader_email: Option<String>,
    likes: Option<String>,
    comments: Option<String>,
}

impl UploadForm {
    fn insert(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "uploaderName" | "name" => &mut self.uploader_name,
            "uploaderEmail" | "email" => &mut self.uploader_email,
            "likes" => &mut self.likes,
            "comments" => &mut self.comments,
            _ => {
                tracing::trace!(name, "ignoring unknown form field");
                return;
            }
        };
        *slot = Some(value);
    }

    fn into_fields(self) -> ApiResult<VideoFields> {
        let field = |name: &str, value: Option<String>| {
            value.ok_or_else(|| ApiError::bad_request(format!("missing field {name}")))
        };

        let likes = parse_json_list::<LikeBody>("likes", self.likes)?
            .into_iter()
            .map(LikeBody::into_like)
            .collect::<ApiResult<Vec<Like>>>()?;
        let comments = parse_json_list::<CommentBody>("comments", self.comments)?
            .into_iter()
            .map(CommentBody::into_comment)
            .collect::<ApiResult<Vec<Comment>>>()?;

        Ok(VideoFields {
            title: field("title", self.title)?,
            description: field("description", self.description)?,
            uploader_name: field("uploaderName", self.uploader_name)?,
            uploader_email: require("uploaderEmail", field("uploaderEmail", self.uploader_email)?)?,
            likes,
            comments,
        })
    }
}

/// Parses an optional JSON array field. Absent and blank fields are empty lists.
fn parse_json_list<T>(name: &str, value: Option<String>) -> ApiResult<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json)
            .map_err(|err| ApiError::bad_request(format!("invalid field {name}: {err}"))),
    }
}

async fn video_upload(
    State(state): State<ServiceState>,
    FormData(mut multipart): FormData,
) -> ApiResult<Json<VideoResponse>> {
    let mut form = UploadForm::default();
    let mut staged: Option<StagedUpload> = None;

    // Dropping `staged` on any early return aborts the upload.
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name != FILE_FIELD {
            form.insert(&name, field.text().await?);
            continue;
        }

        if staged.is_some() {
            return Err(ApiError::bad_request("more than one video file"));
        }

        let content_type = field
            .content_type()
            .map_or_else(|| DEFAULT_CONTENT_TYPE.to_owned(), ToString::to_string);
        let stream = field.map_err(io::Error::other).boxed();
        staged = Some(state.gateway.stage(&content_type, stream).await?);
    }

    let Some(staged) = staged else {
        return Err(ApiError::bad_request("no video file uploaded"));
    };

    let fields = match form.into_fields() {
        Ok(fields) => fields,
        Err(error) => {
            staged.abort().await;
            return Err(error);
        }
    };

    let record = staged.commit(fields).await?;
    tracing::info!(
        record_id = %record.record_id,
        object_id = %record.object_id,
        "video uploaded"
    );

    Ok(Json(VideoResponse::new(&state, record)))
}

async fn videos_list(State(state): State<ServiceState>) -> ApiResult<Json<Vec<VideoResponse>>> {
    let records = state.gateway.records().list_records().await?;
    let videos = records
        .into_iter()
        .map(|record| VideoResponse::new(&state, record))
        .collect();
    Ok(Json(videos))
}

async fn video_get(
    State(state): State<ServiceState>,
    Xt(id): Xt<RecordId>,
) -> ApiResult<Json<VideoResponse>> {
    let record = state.gateway.records().get_record(&id).await?;
    Ok(Json(VideoResponse::new(&state, record)))
}

/// Response returned when deleting a video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteVideoResponse {
    message: &'static str,
    record_id: RecordId,
}

async fn video_delete(
    State(state): State<ServiceState>,
    Xt(id): Xt<RecordId>,
) -> ApiResult<Json<DeleteVideoResponse>> {
    state.gateway.delete(&id).await?;
    Ok(Json(DeleteVideoResponse {
        message: "Item deleted successfully",
        record_id: id,
    }))
}

async fn video_stream(
    State(state): State<ServiceState>,
    Xt(id): Xt<ObjectId>,
    RangeHeader(range): RangeHeader,
) -> ApiResult<Response> {
    let read = state
        .gateway
        .download(id, range)
        .await
        .map_err(ApiError::download)?;

    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&read.object.content_type)
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(read.content_length()));

    let status = if range.is_some() {
        let content_range = format!(
            "bytes {}-{}/{}",
            read.range.start(),
            read.range.end(),
            read.object.total_length
        );
        if let Ok(value) = HeaderValue::try_from(content_range) {
            headers.insert(header::CONTENT_RANGE, value);
        }
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Ok((status, headers, Body::from_stream(read.stream)).into_response())
}
