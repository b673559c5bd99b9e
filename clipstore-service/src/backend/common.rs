//! Traits implemented by storage engines.

use std::fmt::Debug;

use bytes::Bytes;

use crate::PayloadStream;
use crate::error::Result;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A type-erased [`DocumentStore`] instance.
pub type BoxedDocumentStore = Box<dyn DocumentStore>;

/// Storage for opaque binary objects addressed by a slash-separated path.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores an object at the given path, replacing any previous object atomically.
    async fn put_object(&self, path: &str, stream: PayloadStream) -> Result<()>;

    /// Retrieves the object at the given path as a stream of bytes.
    async fn get_object(&self, path: &str) -> Result<Option<PayloadStream>>;

    /// Deletes all objects whose path starts with `prefix`.
    ///
    /// Deleting a prefix without any objects is not an error.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// Monotonic revision of a stored document, starting at `1`.
pub type Revision = u64;

/// A document as stored in a [`DocumentStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// The id of the document within its collection.
    pub id: String,
    /// The revision, incremented on every successful swap.
    pub revision: Revision,
    /// The serialized document body.
    pub body: Bytes,
}

/// Result of [`DocumentStore::compare_and_swap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The body was replaced; contains the new revision.
    Swapped(Revision),
    /// The document has been modified since the expected revision was read.
    Conflict,
    /// The document no longer exists.
    Missing,
}

/// Storage for small documents grouped into collections.
///
/// Each document carries a [`Revision`]. Writers that need to mutate a document without losing
/// concurrent updates read it, apply their change, and call
/// [`compare_and_swap`](DocumentStore::compare_and_swap) with the revision they read. Every
/// successful swap on a document happens in a single total order.
#[async_trait::async_trait]
pub trait DocumentStore: Debug + Send + Sync + 'static {
    /// The store name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Fetches a document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Inserts a new document at revision `1`.
    ///
    /// Fails with [`Error::InvalidInput`](crate::Error::InvalidInput) if the id is taken.
    async fn insert(&self, collection: &str, id: &str, body: Bytes) -> Result<Revision>;

    /// Replaces the body of a document if it is still at `expected` revision.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: Revision,
        body: Bytes,
    ) -> Result<CasOutcome>;

    /// Deletes a document, returning whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Lists all documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;
}
