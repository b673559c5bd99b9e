//! Chunked storage of large binary objects.
//!
//! A [`ChunkStore`] splits objects into fixed-size chunks stored under
//! `chunks/<object id>/<sequence>`. Only one chunk is ever held in memory, both when writing
//! and when reading, regardless of the object size.
//!
//! All chunks but the last one have exactly the object's `chunk_size`, which allows byte ranges
//! to be served by seeking directly to the chunk containing the first requested byte.

use std::io;
use std::ops::RangeInclusive;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::PayloadStream;
use crate::catalog::{BlobObject, ObjectCatalog, UploadState};
use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::service::StorageEngine;

/// Default size of a single chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024; // 1 MiB

/// A byte range requested by a reader, before it is resolved against an object's length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// `start..=end`, inclusive on both ends. `end` is clamped to the object length.
    Bounded(u64, u64),
    /// Everything from the given offset to the end.
    From(u64),
    /// The last `n` bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Resolves the range against an object of `total_length` bytes.
    pub fn resolve(self, total_length: u64) -> Result<RangeInclusive<u64>> {
        let unsatisfiable = Error::RangeNotSatisfiable { total_length };
        if total_length == 0 {
            return Err(unsatisfiable);
        }

        let last = total_length - 1;
        let range = match self {
            Self::Bounded(start, end) if start <= end && start <= last => start..=end.min(last),
            Self::From(start) if start <= last => start..=last,
            Self::Suffix(n) if n > 0 => total_length.saturating_sub(n)..=last,
            _ => return Err(unsatisfiable),
        };

        Ok(range)
    }
}

/// A lazily evaluated read of a completed object.
pub struct ReadStream {
    /// The catalog entry of the object being read.
    pub object: BlobObject,
    /// The inclusive byte range produced by `stream`.
    pub range: RangeInclusive<u64>,
    /// The object bytes, produced one chunk at a time.
    pub stream: PayloadStream,
}

impl ReadStream {
    /// Returns the number of bytes the stream will produce.
    pub fn content_length(&self) -> u64 {
        self.range.end() - self.range.start() + 1
    }

    /// Returns `true` if the stream covers only part of the object.
    pub fn is_partial(&self) -> bool {
        self.content_length() != self.object.total_length
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("object", &self.object)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

/// Splits objects into chunks and reassembles them on read.
///
/// Each object must have a single writer. Concurrent writers to the same object are detected
/// through the catalog, but may overwrite each other's chunk payloads.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    engine: StorageEngine,
    catalog: ObjectCatalog,
    chunk_size: u64,
}

impl ChunkStore {
    /// Creates a store writing chunks of `chunk_size` bytes for new uploads.
    pub fn new(engine: StorageEngine, catalog: ObjectCatalog, chunk_size: u64) -> Self {
        Self {
            engine,
            catalog,
            chunk_size: chunk_size.max(1),
        }
    }

    /// The size of chunks for newly started uploads.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// The catalog consulted by this store.
    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    /// Allocates a new object in the `Writing` state.
    pub async fn begin_upload(&self, content_type: &str) -> Result<ObjectId> {
        let object = BlobObject::new(content_type, self.chunk_size);
        self.catalog.put(&object).await?;
        tracing::debug!(object_id = %object.id, content_type, "upload started");
        Ok(object.id)
    }

    /// Appends the chunk with the given sequence number.
    ///
    /// Sequence numbers start at `0` and must increase by one with every chunk. Every chunk but
    /// the last must be exactly `chunk_size` bytes long.
    pub async fn write_chunk(&self, id: &ObjectId, sequence: u64, bytes: Bytes) -> Result<()> {
        let object = self.catalog.find(id).await?.ok_or(Error::UnknownObject)?;
        validate_chunk(&object, sequence, &bytes)?;

        let len = bytes.len() as u64;
        let path = chunk_path(id, sequence);
        let stream = futures_util::stream::once(async move { Ok(bytes) }).boxed();
        self.engine.blobs().put_object(&path, stream).await?;

        let updated = self
            .catalog
            .update(id, |object| {
                if object.state != UploadState::Writing {
                    return Err(Error::UnknownObject);
                }
                if object.chunk_count != sequence {
                    return Err(Error::OutOfOrderChunk {
                        expected: object.chunk_count,
                        actual: sequence,
                    });
                }

                object.chunk_count += 1;
                object.total_length += len;
                object.updated = SystemTime::now();
                Ok(true)
            })
            .await
            .map_err(|err| match err {
                Error::NotFound => Error::UnknownObject,
                err => err,
            });

        if let Err(error) = updated {
            // The object was aborted while the chunk was written. Its purge may have run before
            // the chunk existed.
            if matches!(error, Error::UnknownObject) {
                if let Err(cleanup) = self.engine.blobs().delete_prefix(&path).await {
                    tracing::warn!(
                        object_id = %id,
                        sequence,
                        error = &cleanup as &dyn std::error::Error,
                        "failed to delete orphaned chunk"
                    );
                }
            }
            return Err(error);
        }

        tracing::trace!(object_id = %id, sequence, len, "chunk written");
        Ok(())
    }

    /// Marks the object completed, making it visible to readers.
    pub async fn complete_upload(&self, id: &ObjectId, total_length: u64) -> Result<BlobObject> {
        let object = self.catalog.mark_completed(id, total_length).await?;
        tracing::debug!(
            object_id = %id,
            chunks = object.chunk_count,
            total_length,
            "upload completed"
        );
        Ok(object)
    }

    /// Opens a stream over a completed object, optionally restricted to a byte range.
    ///
    /// Every call opens an independent cursor. Unknown and incomplete objects, as well as
    /// objects whose first chunk is missing, yield [`Error::NotFound`].
    pub async fn open_read_stream(
        &self,
        id: &ObjectId,
        range: Option<ByteRange>,
    ) -> Result<ReadStream> {
        let object = self.catalog.get(id).await?;
        let range = match range {
            Some(range) => range.resolve(object.total_length)?,
            None if object.total_length > 0 => 0..=object.total_length - 1,
            None => return Err(Error::NotFound),
        };

        let chunk_size = object.chunk_size.max(1);
        let first_sequence = range.start() / chunk_size;
        let last_sequence = range.end() / chunk_size;

        // Fetch the first chunk eagerly so missing data surfaces before any byte is sent.
        let Some(first_chunk) = self.read_chunk(id, first_sequence).await? else {
            tracing::warn!(object_id = %id, "completed object is missing chunks");
            return Err(Error::NotFound);
        };

        let stream = self
            .clone()
            .make_chunk_stream(
                *id,
                first_chunk,
                first_sequence..=last_sequence,
                chunk_size,
                range.clone(),
            )
            .boxed();

        Ok(ReadStream {
            object,
            range,
            stream,
        })
    }

    /// Discards a `Writing` or `Aborted` object and its chunks.
    ///
    /// Completed objects are rejected with [`Error::UnknownObject`]; use
    /// [`delete_object`](Self::delete_object) for those. Missing objects are ignored.
    pub async fn abort_upload(&self, id: &ObjectId) -> Result<()> {
        if self.catalog.mark_aborted(id, false).await?.is_some() {
            self.purge(id).await?;
            tracing::debug!(object_id = %id, "upload aborted");
        }
        Ok(())
    }

    /// Removes an object and all of its chunks. Deleting a missing object is not an error.
    pub async fn delete_object(&self, id: &ObjectId) -> Result<()> {
        if self.catalog.mark_aborted(id, true).await?.is_some() {
            self.purge(id).await?;
            tracing::debug!(object_id = %id, "object deleted");
        }
        Ok(())
    }

    /// Deletes the chunks of an object first, then its catalog entry.
    ///
    /// If deleting chunks fails, the aborted entry remains so the reaper can retry.
    async fn purge(&self, id: &ObjectId) -> Result<()> {
        self.engine.blobs().delete_prefix(&chunk_prefix(id)).await?;
        self.catalog.remove(id).await?;
        Ok(())
    }

    async fn read_chunk(&self, id: &ObjectId, sequence: u64) -> Result<Option<Bytes>> {
        let path = chunk_path(id, sequence);
        let Some(stream) = self.engine.blobs().get_object(&path).await? else {
            return Ok(None);
        };

        let bytes: BytesMut = stream
            .try_collect()
            .await
            .map_err(|err| Error::storage(format!("reading chunk {path}"), err))?;
        Ok(Some(bytes.freeze()))
    }

    fn make_chunk_stream(
        self,
        id: ObjectId,
        first_chunk: Bytes,
        sequences: RangeInclusive<u64>,
        chunk_size: u64,
        range: RangeInclusive<u64>,
    ) -> impl Stream<Item = io::Result<Bytes>> + use<> {
        async_stream::try_stream! {
            let mut first_chunk = Some(first_chunk);
            for sequence in sequences {
                let chunk = match first_chunk.take() {
                    Some(chunk) => chunk,
                    None => self
                        .read_chunk(&id, sequence)
                        .await
                        .map_err(io::Error::other)?
                        .ok_or_else(|| io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("chunk {sequence} of object {id} is missing"),
                        ))?,
                };

                let offset = sequence * chunk_size;
                let start = range.start().saturating_sub(offset) as usize;
                let end = ((range.end() + 1 - offset) as usize).min(chunk.len());
                if start < end {
                    yield chunk.slice(start..end);
                }
            }
        }
    }
}

fn validate_chunk(object: &BlobObject, sequence: u64, bytes: &Bytes) -> Result<()> {
    if object.state != UploadState::Writing {
        return Err(Error::UnknownObject);
    }
    if object.chunk_count != sequence {
        return Err(Error::OutOfOrderChunk {
            expected: object.chunk_count,
            actual: sequence,
        });
    }
    if bytes.is_empty() {
        return Err(Error::InvalidInput("empty chunk".into()));
    }
    if bytes.len() as u64 > object.chunk_size {
        return Err(Error::InvalidInput(format!(
            "chunk of {} bytes exceeds chunk size {}",
            bytes.len(),
            object.chunk_size
        )));
    }
    if object.total_length != object.chunk_count * object.chunk_size {
        return Err(Error::InvalidInput(
            "chunk written after the final short chunk".into(),
        ));
    }
    Ok(())
}

fn chunk_prefix(id: &ObjectId) -> String {
    format!("chunks/{id}/")
}

fn chunk_path(id: &ObjectId, sequence: u64) -> String {
    format!("chunks/{id}/{sequence:010}")
}
