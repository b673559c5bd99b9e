//! Orchestration of uploads and downloads.
//!
//! The [`StreamingGateway`] drives the [`ChunkStore`] and the [`MetadataRepository`] as one
//! logical unit. An upload only becomes visible once its byte stream has been fully drained
//! into chunks, the object has been completed and its record has been written. Every failure
//! along the way rolls back what was written so far.
//!
//! Uploads are split into two phases so callers can start streaming bytes before all
//! descriptive fields are known:
//!
//! 1. [`StreamingGateway::stage`] drains the byte stream into chunks of an object that stays
//!    in the `Writing` state.
//! 2. [`StagedUpload::commit`] completes the object and creates its record.
//!
//! A [`StagedUpload`] that is dropped without being committed aborts its object in the
//! background. This also covers futures that are cancelled mid-upload, for instance because
//! the client disconnected.

use std::fmt;

use bytes::BytesMut;
use futures_util::TryStreamExt;

use crate::PayloadStream;
use crate::chunks::{ByteRange, ChunkStore, DEFAULT_CHUNK_SIZE, ReadStream};
use crate::catalog::ObjectCatalog;
use crate::error::{Error, Result};
use crate::id::{ObjectId, RecordId};
use crate::records::{MetadataRepository, VideoFields, VideoRecord};
use crate::service::StorageEngine;

/// Tunables of the [`StreamingGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Size of chunks for new uploads.
    pub chunk_size: u64,
    /// Maximum size of a single upload. Unlimited if `None`.
    pub max_upload_size: Option<u64>,
    /// Whether deleting a record also deletes its stored object.
    pub cascade_delete: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: None,
            cascade_delete: true,
        }
    }
}

/// Identifies the video to download, either directly or through its record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoRef {
    /// A stored object.
    Object(ObjectId),
    /// The record referencing a stored object.
    Record(RecordId),
}

impl From<ObjectId> for VideoRef {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl From<RecordId> for VideoRef {
    fn from(id: RecordId) -> Self {
        Self::Record(id)
    }
}

/// Entry point for uploading, downloading and deleting videos.
#[derive(Clone, Debug)]
pub struct StreamingGateway {
    chunks: ChunkStore,
    records: MetadataRepository,
    options: GatewayOptions,
}

impl StreamingGateway {
    /// Creates a gateway and its underlying components on top of the given engine.
    pub fn new(engine: StorageEngine, options: GatewayOptions) -> Self {
        let catalog = ObjectCatalog::new(engine.clone());
        Self {
            chunks: ChunkStore::new(engine.clone(), catalog, options.chunk_size),
            records: MetadataRepository::new(engine),
            options,
        }
    }

    /// The chunk store objects are written to.
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// The repository holding video records.
    pub fn records(&self) -> &MetadataRepository {
        &self.records
    }

    /// The options this gateway was created with.
    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Uploads a video and creates its record in one step.
    pub async fn upload(
        &self,
        fields: VideoFields,
        content_type: &str,
        stream: PayloadStream,
    ) -> Result<VideoRecord> {
        self.stage(content_type, stream).await?.commit(fields).await
    }

    /// Drains `stream` into a new object without making it visible.
    ///
    /// Fails with [`Error::EmptyUpload`] if the stream yields no bytes or ends with an error, and
    /// with [`Error::UploadTooLarge`] if it exceeds the configured maximum. In all cases, the
    /// partial object is aborted.
    pub async fn stage(&self, content_type: &str, stream: PayloadStream) -> Result<StagedUpload> {
        let object_id = self.chunks.begin_upload(content_type).await?;
        let mut guard = UploadGuard::new(self.chunks.clone(), object_id);

        match self.write_chunks(&object_id, stream).await {
            Ok(total_length) => Ok(StagedUpload {
                gateway: self.clone(),
                guard,
                total_length,
            }),
            Err(error) => {
                tracing::debug!(object_id = %object_id, error = &error as &dyn std::error::Error, "upload failed");
                guard.rollback().await;
                Err(error)
            }
        }
    }

    /// Opens a lazy read stream over a stored video.
    ///
    /// Missing records, objects and chunks all yield [`Error::NotFound`].
    pub async fn download(
        &self,
        video: impl Into<VideoRef>,
        range: Option<ByteRange>,
    ) -> Result<ReadStream> {
        let object_id = match video.into() {
            VideoRef::Object(id) => id,
            VideoRef::Record(id) => self.records.get_record(&id).await?.object_id,
        };

        self.chunks.open_read_stream(&object_id, range).await
    }

    /// Deletes a record and, if configured, its stored object.
    pub async fn delete(&self, id: &RecordId) -> Result<VideoRecord> {
        let record = self.records.get_record(id).await?;
        if !self.records.delete_record(id).await? {
            return Err(Error::NotFound);
        }

        if self.options.cascade_delete {
            self.chunks.delete_object(&record.object_id).await?;
        }

        tracing::debug!(record_id = %id, object_id = %record.object_id, "record deleted");
        Ok(record)
    }

    /// Splits the stream into fixed-size windows and writes them as consecutive chunks.
    async fn write_chunks(&self, id: &ObjectId, mut stream: PayloadStream) -> Result<u64> {
        let chunk_size = self.chunks.chunk_size() as usize;
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut sequence = 0;
        let mut total_length = 0u64;

        while let Some(bytes) = stream.try_next().await.map_err(|error| {
            tracing::debug!(object_id = %id, %error, "upload stream ended early");
            Error::EmptyUpload
        })? {
            total_length += bytes.len() as u64;
            if let Some(limit) = self.options.max_upload_size.filter(|l| total_length > *l) {
                return Err(Error::UploadTooLarge { limit });
            }

            buffer.extend_from_slice(&bytes);
            while buffer.len() >= chunk_size {
                let chunk = buffer.split_to(chunk_size).freeze();
                self.chunks.write_chunk(id, sequence, chunk).await?;
                sequence += 1;
            }
        }

        if !buffer.is_empty() {
            self.chunks.write_chunk(id, sequence, buffer.freeze()).await?;
        }

        if total_length == 0 {
            return Err(Error::EmptyUpload);
        }

        Ok(total_length)
    }
}

/// An upload whose bytes are fully written but which is not yet visible.
///
/// Dropping a staged upload aborts it.
#[must_use = "staged uploads are aborted unless committed"]
pub struct StagedUpload {
    gateway: StreamingGateway,
    guard: UploadGuard,
    total_length: u64,
}

impl StagedUpload {
    /// The identifier of the staged object.
    pub fn object_id(&self) -> ObjectId {
        self.guard.object_id
    }

    /// The number of bytes written.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Completes the object and creates its record.
    ///
    /// If creating the record fails, the completed object is deleted again.
    pub async fn commit(mut self, fields: VideoFields) -> Result<VideoRecord> {
        match self.try_commit(fields).await {
            Ok(record) => {
                self.guard.disarm();
                Ok(record)
            }
            Err(error) => {
                self.guard.rollback().await;
                Err(error)
            }
        }
    }

    /// Discards the staged object.
    pub async fn abort(mut self) {
        self.guard.rollback().await;
    }

    async fn try_commit(&mut self, fields: VideoFields) -> Result<VideoRecord> {
        let chunks = &self.gateway.chunks;
        let object = chunks
            .complete_upload(&self.guard.object_id, self.total_length)
            .await?;
        self.guard.stage = GuardStage::Completed;

        self.gateway.records.create_record(fields, &object).await
    }
}

impl fmt::Debug for StagedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedUpload")
            .field("object_id", &self.guard.object_id)
            .field("total_length", &self.total_length)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GuardStage {
    /// The object is still `Writing` and must be aborted.
    Writing,
    /// The object is `Completed` but has no record yet and must be deleted.
    Completed,
    /// Nothing to roll back.
    Disarmed,
}

/// Rolls back a partially written upload when dropped.
struct UploadGuard {
    chunks: ChunkStore,
    object_id: ObjectId,
    stage: GuardStage,
}

impl UploadGuard {
    fn new(chunks: ChunkStore, object_id: ObjectId) -> Self {
        Self {
            chunks,
            object_id,
            stage: GuardStage::Writing,
        }
    }

    fn disarm(&mut self) {
        self.stage = GuardStage::Disarmed;
    }

    /// Rolls back in place. Failures are logged and left to the reaper.
    async fn rollback(&mut self) {
        let stage = std::mem::replace(&mut self.stage, GuardStage::Disarmed);
        rollback(&self.chunks, self.object_id, stage).await;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.stage == GuardStage::Disarmed {
            return;
        }

        let stage = self.stage;
        let chunks = self.chunks.clone();
        let object_id = self.object_id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(object_id = %object_id, "upload dropped, rolling back");
                handle.spawn(async move { rollback(&chunks, object_id, stage).await });
            }
            Err(_) => {
                tracing::warn!(object_id = %object_id, "upload dropped outside of a runtime");
            }
        }
    }
}

async fn rollback(chunks: &ChunkStore, object_id: ObjectId, stage: GuardStage) {
    let result = match stage {
        GuardStage::Writing => chunks.abort_upload(&object_id).await,
        GuardStage::Completed => chunks.delete_object(&object_id).await,
        GuardStage::Disarmed => return,
    };

    if let Err(error) = result {
        tracing::warn!(
            object_id = %object_id,
            error = &error as &dyn std::error::Error,
            "failed to roll back upload"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::StreamExt;

    use super::*;
    use crate::backend::in_memory::{InMemoryBackend, InMemoryDocumentStore};
    use crate::stream::{make_stream, read_to_vec};

    const MIB: u64 = 1024 * 1024;

    struct Harness {
        gateway: StreamingGateway,
        blobs: InMemoryBackend,
        documents: InMemoryDocumentStore,
    }

    impl Harness {
        fn new(options: GatewayOptions) -> Self {
            let blobs = InMemoryBackend::new();
            let documents = InMemoryDocumentStore::new();
            let engine =
                StorageEngine::from_parts(Box::new(blobs.clone()), Box::new(documents.clone()));
            Self {
                gateway: StreamingGateway::new(engine, options),
                blobs,
                documents,
            }
        }

        fn with_chunk_size(chunk_size: u64) -> Self {
            Self::new(GatewayOptions {
                chunk_size,
                ..Default::default()
            })
        }

        /// Asserts that nothing of a failed upload is left behind.
        fn assert_empty(&self) {
            assert!(self.blobs.is_empty());
            assert_eq!(self.documents.count("objects"), 0);
            assert_eq!(self.documents.count("videos"), 0);
        }
    }

    fn make_fields() -> VideoFields {
        VideoFields {
            title: "title".into(),
            description: "description".into(),
            uploader_name: "Uploader".into(),
            uploader_email: "uploader@example.com".into(),
            ..Default::default()
        }
    }

    fn make_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Streams the payload in pieces that do not line up with chunk boundaries.
    fn make_uneven_stream(payload: &[u8]) -> PayloadStream {
        let pieces: Vec<_> = payload
            .chunks(7)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        futures_util::stream::iter(pieces).boxed()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn round_trips_payloads_around_chunk_boundaries() {
        let chunk_size = 16;
        for (len, chunks) in [(15, 1), (16, 1), (16 * 3 + 5, 4)] {
            let harness = Harness::with_chunk_size(chunk_size);
            let payload = make_payload(len);

            let record = harness
                .gateway
                .upload(make_fields(), "video/mp4", make_uneven_stream(&payload))
                .await
                .unwrap();

            let read = harness.gateway.download(record.object_id, None).await.unwrap();
            assert_eq!(read.object.chunk_count, chunks, "len {len}");
            assert_eq!(read.object.total_length, len as u64);
            assert_eq!(read_to_vec(read.stream).await.unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn uploads_three_mebibytes_in_three_chunks() {
        let harness = Harness::with_chunk_size(MIB);
        let payload = make_payload(3 * MIB as usize);

        let record = harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(&payload))
            .await
            .unwrap();
        assert_eq!(harness.blobs.len(), 3);

        let read = harness.gateway.download(record.record_id, None).await.unwrap();
        assert_eq!(read.object.chunk_count, 3);
        assert_eq!(read.object.total_length, 3 * MIB);
        assert_eq!(read.object.content_type, "video/mp4");
        assert_eq!(read_to_vec(read.stream).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn rejects_empty_uploads() {
        let harness = Harness::with_chunk_size(16);

        let stream: PayloadStream = futures_util::stream::empty().boxed();
        let err = harness
            .gateway
            .upload(make_fields(), "video/mp4", stream)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyUpload));
        harness.assert_empty();
    }

    #[tokio::test]
    async fn truncated_uploads_leave_nothing_behind() {
        let harness = Harness::with_chunk_size(16);

        let stream: PayloadStream = futures_util::stream::iter([
            Ok(Bytes::from(make_payload(40))),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset")),
        ])
        .boxed();
        let err = harness
            .gateway
            .upload(make_fields(), "video/mp4", stream)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyUpload));
        assert!(harness.gateway.records().list_records().await.unwrap().is_empty());
        harness.assert_empty();
    }

    #[tokio::test]
    async fn enforces_upload_size_limit() {
        let harness = Harness::new(GatewayOptions {
            chunk_size: 16,
            max_upload_size: Some(32),
            ..Default::default()
        });

        let err = harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(&make_payload(33)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UploadTooLarge { limit: 32 }));
        harness.assert_empty();

        harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(&make_payload(32)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn staged_uploads_are_invisible_until_committed() {
        let harness = Harness::with_chunk_size(16);
        let staged = harness
            .gateway
            .stage("video/webm", make_stream(b"hello world"))
            .await
            .unwrap();
        let object_id = staged.object_id();
        assert_eq!(staged.total_length(), 11);

        let err = harness.gateway.download(object_id, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
        assert!(harness.gateway.records().list_records().await.unwrap().is_empty());

        let record = staged.commit(make_fields()).await.unwrap();
        assert_eq!(record.object_id, object_id);
        assert_eq!(record.content_type, "video/webm");

        let read = harness.gateway.download(object_id, None).await.unwrap();
        assert_eq!(read_to_vec(read.stream).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn aborting_staged_uploads_removes_chunks() {
        let harness = Harness::with_chunk_size(4);
        let staged = harness
            .gateway
            .stage("video/mp4", make_stream(b"hello world"))
            .await
            .unwrap();
        assert_eq!(harness.blobs.len(), 3);

        staged.abort().await;
        harness.assert_empty();
    }

    #[tokio::test]
    async fn dropped_staged_uploads_are_aborted() {
        let harness = Harness::with_chunk_size(4);
        let staged = harness
            .gateway
            .stage("video/mp4", make_stream(b"hello world"))
            .await
            .unwrap();
        drop(staged);

        let blobs = harness.blobs.clone();
        let documents = harness.documents.clone();
        wait_until(|| blobs.is_empty() && documents.count("objects") == 0).await;
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let harness = Harness::with_chunk_size(16);

        let err = harness
            .gateway
            .download(ObjectId::generate(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));

        let err = harness
            .gateway
            .download(RecordId::generate(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));

        let err = harness.gateway.delete(&RecordId::generate()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn deletes_cascade_to_objects() {
        let harness = Harness::with_chunk_size(4);
        let record = harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(b"hello world"))
            .await
            .unwrap();

        harness.gateway.delete(&record.record_id).await.unwrap();
        harness.assert_empty();

        let err = harness.gateway.download(record.object_id, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn deletes_keep_objects_without_cascade() {
        let harness = Harness::new(GatewayOptions {
            chunk_size: 4,
            cascade_delete: false,
            ..Default::default()
        });
        let record = harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(b"hello world"))
            .await
            .unwrap();

        harness.gateway.delete(&record.record_id).await.unwrap();

        let err = harness
            .gateway
            .download(record.record_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
        let read = harness.gateway.download(record.object_id, None).await.unwrap();
        assert_eq!(read_to_vec(read.stream).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn downloads_ranges_across_chunks() {
        let harness = Harness::with_chunk_size(4);
        let record = harness
            .gateway
            .upload(make_fields(), "video/mp4", make_stream(b"hello world"))
            .await
            .unwrap();

        let read = harness
            .gateway
            .download(record.object_id, Some(ByteRange::Bounded(3, 7)))
            .await
            .unwrap();
        assert!(read.is_partial());
        assert_eq!(read.content_length(), 5);
        assert_eq!(read_to_vec(read.stream).await.unwrap(), b"lo wo");
    }
}
