//! Request and response bodies shared by the endpoints.

use std::time::SystemTime;

use clipstore_service::records::{Comment, Like, VideoRecord};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::Services;

/// A video record as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    /// The stored record.
    #[serde(flatten)]
    pub record: VideoRecord,
    /// URL to stream the video from.
    pub video_url: String,
}

impl VideoResponse {
    /// Attaches the playback URL to a record.
    pub fn new(state: &Services, record: VideoRecord) -> Self {
        let video_url = state.playback_url(&record.object_id);
        Self { record, video_url }
    }
}

/// A like as submitted by clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeBody {
    /// Email of the liking user.
    pub user_email: String,
    /// Display name of the liking user.
    #[serde(default)]
    pub user_name: String,
}

impl LikeBody {
    /// Validates the body and converts it into a [`Like`].
    pub fn into_like(self) -> ApiResult<Like> {
        Ok(Like {
            user_email: require("userEmail", self.user_email)?,
            user_name: self.user_name,
        })
    }
}

/// A comment as submitted by clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    /// Email of the author.
    pub user_email: String,
    /// Display name of the author.
    #[serde(default)]
    pub user_name: String,
    /// The comment text.
    pub text: String,
    /// When the comment was written. Defaults to the time it is received.
    #[serde(default, with = "humantime_serde::option")]
    pub timestamp: Option<SystemTime>,
}

impl CommentBody {
    /// Validates the body and converts it into a [`Comment`].
    pub fn into_comment(self) -> ApiResult<Comment> {
        Ok(Comment {
            user_email: require("userEmail", self.user_email)?,
            user_name: self.user_name,
            text: self.text,
            timestamp: self.timestamp.unwrap_or_else(SystemTime::now),
        })
    }
}

/// Rejects blank values of required fields.
pub fn require(name: &str, value: String) -> ApiResult<String> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("missing field {name}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn comments_default_to_now() {
        let body: CommentBody =
            serde_json::from_str(r#"{"userEmail": "a@example.com", "text": "hi"}"#).unwrap();
        let before = SystemTime::now();
        let comment = body.into_comment().unwrap();
        assert!(comment.timestamp >= before);
        assert_eq!(comment.user_name, "");
    }

    #[test]
    fn comments_keep_client_timestamps() {
        let body: CommentBody = serde_json::from_str(
            r#"{"userEmail": "a@example.com", "userName": "A", "text": "hi", "timestamp": "2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        let comment = body.into_comment().unwrap();
        assert_eq!(
            comment.timestamp,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_714_564_800)
        );
    }

    #[test]
    fn rejects_blank_emails() {
        let body = LikeBody {
            user_email: "  ".into(),
            user_name: "A".into(),
        };
        assert!(matches!(body.into_like(), Err(ApiError::BadRequest(_))));
    }
}
