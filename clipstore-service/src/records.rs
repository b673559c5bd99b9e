//! Video metadata and social interactions.
//!
//! [`MetadataRepository`] stores one [`VideoRecord`] per uploaded video. Likes and comments are
//! mutated exclusively through dedicated atomic operations, each applied as an optimistic
//! update against the record's revision. Concurrent interactions on the same record are
//! therefore linearizable and never lose each other's changes, while interactions on different
//! records touch different documents and never contend.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::catalog::BlobObject;
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::id::{ObjectId, RecordId};
use crate::service::StorageEngine;

const COLLECTION: &str = "videos";

/// A user's like. Likes are unique per `user_email`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    /// Identifies the user. At most one like per email is kept.
    pub user_email: String,
    /// Display name of the user.
    pub user_name: String,
}

/// A comment on a video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Email of the author.
    pub user_email: String,
    /// Display name of the author.
    pub user_name: String,
    /// The comment body.
    pub text: String,
    /// When the comment was written.
    #[serde(with = "humantime_serde")]
    pub timestamp: SystemTime,
}

/// Descriptive fields supplied with an upload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoFields {
    /// Title of the video.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Display name of the uploader.
    pub uploader_name: String,
    /// Email of the uploader.
    pub uploader_email: String,
    /// Likes to seed the record with. Duplicate emails are dropped, keeping the first.
    pub likes: Vec<Like>,
    /// Comments to seed the record with, in order.
    pub comments: Vec<Comment>,
}

/// The metadata document of a video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Identifier of this record.
    pub record_id: RecordId,
    /// The stored video. The object's lifetime is independent of the record.
    pub object_id: ObjectId,
    /// See [`VideoFields::title`].
    pub title: String,
    /// See [`VideoFields::description`].
    pub description: String,
    /// See [`VideoFields::uploader_name`].
    pub uploader_name: String,
    /// See [`VideoFields::uploader_email`].
    pub uploader_email: String,
    /// MIME type of the stored video.
    pub content_type: String,
    /// When the upload completed.
    #[serde(with = "humantime_serde")]
    pub upload_date: SystemTime,
    /// Likes, unique by email, in the order they were added.
    pub likes: Vec<Like>,
    /// Comments in the order they were added.
    pub comments: Vec<Comment>,
}

impl VideoRecord {
    /// Returns `true` if the given user likes this video.
    pub fn is_liked_by(&self, user_email: &str) -> bool {
        self.likes.iter().any(|like| like.user_email == user_email)
    }
}

/// Repository of [`VideoRecord`]s.
#[derive(Clone, Debug)]
pub struct MetadataRepository {
    records: Collection<VideoRecord>,
}

impl MetadataRepository {
    /// Creates a repository on top of the given engine.
    pub fn new(engine: StorageEngine) -> Self {
        Self {
            records: Collection::new(engine, COLLECTION),
        }
    }

    /// Creates a record referencing the given stored object.
    pub async fn create_record(
        &self,
        fields: VideoFields,
        object: &BlobObject,
    ) -> Result<VideoRecord> {
        let VideoFields {
            title,
            description,
            uploader_name,
            uploader_email,
            likes,
            comments,
        } = fields;

        let mut record = VideoRecord {
            record_id: RecordId::generate(),
            object_id: object.id,
            title,
            description,
            uploader_name,
            uploader_email,
            content_type: object.content_type.clone(),
            upload_date: object.completed.unwrap_or_else(SystemTime::now),
            likes: Vec::with_capacity(likes.len()),
            comments,
        };
        for like in likes {
            insert_like(&mut record, like);
        }

        self.records
            .insert(&record.record_id.to_string(), &record)
            .await?;
        tracing::debug!(record_id = %record.record_id, object_id = %record.object_id, "record created");
        Ok(record)
    }

    /// Lists all records, oldest first.
    pub async fn list_records(&self) -> Result<Vec<VideoRecord>> {
        self.records.list().await
    }

    /// Fetches a single record.
    pub async fn get_record(&self, id: &RecordId) -> Result<VideoRecord> {
        self.records
            .get(&id.to_string())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Deletes a record, returning whether it existed.
    pub async fn delete_record(&self, id: &RecordId) -> Result<bool> {
        self.records.delete(&id.to_string()).await
    }

    /// Adds a like unless the user already likes the video.
    pub async fn add_like(
        &self,
        id: &RecordId,
        user_email: &str,
        user_name: &str,
    ) -> Result<VideoRecord> {
        self.records
            .update(&id.to_string(), |record| {
                let like = Like {
                    user_email: user_email.to_owned(),
                    user_name: user_name.to_owned(),
                };
                Ok(insert_like(record, like))
            })
            .await
    }

    /// Removes the user's like. Removing an absent like is a no-op.
    pub async fn remove_like(&self, id: &RecordId, user_email: &str) -> Result<VideoRecord> {
        self.records
            .update(&id.to_string(), |record| {
                let before = record.likes.len();
                record.likes.retain(|like| like.user_email != user_email);
                Ok(record.likes.len() != before)
            })
            .await
    }

    /// Appends a comment.
    pub async fn add_comment(&self, id: &RecordId, comment: Comment) -> Result<VideoRecord> {
        self.records
            .update(&id.to_string(), |record| {
                record.comments.push(comment.clone());
                Ok(true)
            })
            .await
    }
}

fn insert_like(record: &mut VideoRecord, like: Like) -> bool {
    if record.is_liked_by(&like.user_email) {
        return false;
    }
    record.likes.push(like);
    true
}
