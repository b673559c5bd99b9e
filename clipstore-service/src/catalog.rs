//! The durable index of stored binary objects.
//!
//! Every object written through the [`ChunkStore`](crate::chunks::ChunkStore) has exactly one
//! [`BlobObject`] entry in the [`ObjectCatalog`]. The entry tracks the upload state machine
//!
//! ```text
//! Writing --complete--> Completed
//!    |                      |
//!    +--abort--> Aborted <--+--delete
//! ```
//!
//! Readers consult the catalog before touching any chunk, and only `Completed` entries are
//! visible to them.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::service::StorageEngine;

const COLLECTION: &str = "objects";

/// The lifecycle state of a [`BlobObject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Chunks are still being written.
    Writing,
    /// All chunks are durably written and the object is readable.
    Completed,
    /// The object is being discarded; chunks may still be present.
    Aborted,
}

/// Catalog entry describing a stored binary object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    /// The object identifier.
    pub id: ObjectId,
    /// Current upload state.
    pub state: UploadState,
    /// MIME type supplied when the upload started.
    pub content_type: String,
    /// Size of every chunk but the last one.
    pub chunk_size: u64,
    /// Number of chunks written so far.
    pub chunk_count: u64,
    /// Number of bytes written so far.
    pub total_length: u64,
    /// When the upload started.
    #[serde(with = "humantime_serde")]
    pub created: SystemTime,
    /// When the last chunk was written, or the upload started if there is none yet.
    #[serde(with = "humantime_serde")]
    pub updated: SystemTime,
    /// When the upload completed.
    #[serde(default, with = "humantime_serde::option")]
    pub completed: Option<SystemTime>,
}

impl BlobObject {
    /// Creates an entry for an upload that is about to start.
    pub fn new(content_type: impl Into<String>, chunk_size: u64) -> Self {
        let now = SystemTime::now();
        Self {
            id: ObjectId::generate(),
            state: UploadState::Writing,
            content_type: content_type.into(),
            chunk_size,
            chunk_count: 0,
            total_length: 0,
            created: now,
            updated: now,
            completed: None,
        }
    }

    /// Returns `true` if the object is complete and visible to readers.
    pub fn is_completed(&self) -> bool {
        self.state == UploadState::Completed
    }
}

/// Index over [`BlobObject`] entries.
#[derive(Clone, Debug)]
pub struct ObjectCatalog {
    objects: Collection<BlobObject>,
}

impl ObjectCatalog {
    /// Creates a catalog on top of the given engine.
    pub fn new(engine: StorageEngine) -> Self {
        Self {
            objects: Collection::new(engine, COLLECTION),
        }
    }

    /// Returns the entry for `id` in any state.
    pub async fn find(&self, id: &ObjectId) -> Result<Option<BlobObject>> {
        self.objects.get(&id.to_string()).await
    }

    /// Returns the entry for a completed object.
    ///
    /// Objects that do not exist or are not completed yield [`Error::NotFound`].
    pub async fn get(&self, id: &ObjectId) -> Result<BlobObject> {
        match self.find(id).await? {
            Some(object) if object.is_completed() => Ok(object),
            _ => Err(Error::NotFound),
        }
    }

    /// Inserts a new entry.
    pub async fn put(&self, object: &BlobObject) -> Result<()> {
        self.objects.insert(&object.id.to_string(), object).await
    }

    /// Transitions a `Writing` entry to `Completed`.
    ///
    /// Fails with [`Error::UnknownObject`] if the entry is missing or not writing,
    /// [`Error::EmptyUpload`] if no chunk was written, and [`Error::InvalidInput`] if
    /// `total_length` disagrees with the bytes actually written.
    pub async fn mark_completed(&self, id: &ObjectId, total_length: u64) -> Result<BlobObject> {
        self.update(id, |object| {
            if object.state != UploadState::Writing {
                return Err(Error::UnknownObject);
            }
            if object.chunk_count == 0 {
                return Err(Error::EmptyUpload);
            }
            if object.total_length != total_length {
                return Err(Error::InvalidInput(format!(
                    "declared length {total_length} does not match {} bytes written",
                    object.total_length
                )));
            }

            object.state = UploadState::Completed;
            object.completed = Some(SystemTime::now());
            Ok(true)
        })
        .await
        .map_err(|err| match err {
            Error::NotFound => Error::UnknownObject,
            err => err,
        })
    }

    /// Transitions an entry to `Aborted`, hiding it from readers.
    ///
    /// With `allow_completed` unset, completed objects are left untouched and yield
    /// [`Error::UnknownObject`]. Returns `None` if there is no entry.
    pub async fn mark_aborted(
        &self,
        id: &ObjectId,
        allow_completed: bool,
    ) -> Result<Option<BlobObject>> {
        let result = self
            .update(id, |object| match object.state {
                UploadState::Aborted => Ok(false),
                UploadState::Completed if !allow_completed => Err(Error::UnknownObject),
                UploadState::Writing | UploadState::Completed => {
                    object.state = UploadState::Aborted;
                    Ok(true)
                }
            })
            .await;

        match result {
            Ok(object) => Ok(Some(object)),
            Err(Error::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Atomically applies `mutate` to an entry. See [`Collection::update`].
    pub(crate) async fn update<F>(&self, id: &ObjectId, mutate: F) -> Result<BlobObject>
    where
        F: FnMut(&mut BlobObject) -> Result<bool>,
    {
        self.objects.update(&id.to_string(), mutate).await
    }

    /// Removes an entry, returning whether it existed.
    pub async fn remove(&self, id: &ObjectId) -> Result<bool> {
        self.objects.delete(&id.to_string()).await
    }

    /// Lists aborted entries and `Writing` entries without progress since before `cutoff`.
    pub async fn list_stale(&self, cutoff: SystemTime) -> Result<Vec<BlobObject>> {
        let objects = self.objects.list().await?;
        let stale = objects
            .into_iter()
            .filter(|object| match object.state {
                UploadState::Writing => object.updated < cutoff,
                UploadState::Aborted => true,
                UploadState::Completed => false,
            })
            .collect();
        Ok(stale)
    }
}
