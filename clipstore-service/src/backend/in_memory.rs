//! In-memory storage engine.
//!
//! This provides a [`Backend`] and a [`DocumentStore`] backed by maps, removing the need for
//! filesystem tempdir management in unit tests. Both types are [`Clone`] so tests can hold a
//! handle for direct inspection while the service owns a boxed copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};

use super::common::{Backend, CasOutcome, Document, DocumentStore, Revision};
use crate::PayloadStream;
use crate::error::{Error, Result};

/// Binary objects held in a sorted map so prefix deletes are range scans.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an object is stored at the given path.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_object(&self, path: &str, stream: PayloadStream) -> Result<()> {
        let bytes: BytesMut = stream.try_collect().await?;
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_owned(), bytes.freeze());
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Option<PayloadStream>> {
        let entry = self.objects.lock().unwrap().get(path).cloned();
        Ok(entry.map(|bytes| futures_util::stream::once(async move { Ok(bytes) }).boxed()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .retain(|path, _| !path.starts_with(prefix));
        Ok(())
    }
}

type Collections = HashMap<String, BTreeMap<String, (Revision, Bytes)>>;

/// Documents held in per-collection sorted maps behind a single lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.lock().unwrap();
        let document = collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(revision, body)| Document {
                id: id.to_owned(),
                revision: *revision,
                body: body.clone(),
            });
        Ok(document)
    }

    async fn insert(&self, collection: &str, id: &str, body: Bytes) -> Result<Revision> {
        let mut collections = self.collections.lock().unwrap();
        let docs = collections.entry(collection.to_owned()).or_default();
        if docs.contains_key(id) {
            return Err(Error::InvalidInput(format!(
                "document {collection}/{id} already exists"
            )));
        }
        docs.insert(id.to_owned(), (1, body));
        Ok(1)
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: Revision,
        body: Bytes,
    ) -> Result<CasOutcome> {
        let mut collections = self.collections.lock().unwrap();
        let Some((revision, stored)) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
        else {
            return Ok(CasOutcome::Missing);
        };

        if *revision != expected {
            return Ok(CasOutcome::Conflict);
        }

        *revision += 1;
        *stored = body;
        Ok(CasOutcome::Swapped(*revision))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.lock().unwrap();
        let removed = collections
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some());
        Ok(removed)
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let collections = self.collections.lock().unwrap();
        let documents = collections
            .get(collection)
            .into_iter()
            .flatten()
            .map(|(id, (revision, body))| Document {
                id: id.clone(),
                revision: *revision,
                body: body.clone(),
            })
            .collect();
        Ok(documents)
    }
}
