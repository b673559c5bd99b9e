//! Filesystem storage engine.
//!
//! Binary objects are stored as plain files below `<root>/blobs`. Documents are stored as one
//! file per document below `<root>/documents/<collection>`, holding the revision on the first
//! line followed by the body. All writes go to a temporary file that is renamed into place, so
//! readers never observe a partially written object or document.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use super::common::{Backend, CasOutcome, Document, DocumentStore, Revision};
use crate::PayloadStream;
use crate::error::{Error, Result};

const DOCUMENT_EXTENSION: &str = "json";

/// Binary objects stored as files below a root directory.
#[derive(Debug)]
pub struct LocalFsBackend {
    path: PathBuf,
}

impl LocalFsBackend {
    /// Stores objects below `<path>/blobs`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.join("blobs"),
        }
    }
}

#[async_trait::async_trait]
impl Backend for LocalFsBackend {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn put_object(&self, path: &str, stream: PayloadStream) -> Result<()> {
        let path = self.path.join(path);
        let mut reader = pin!(StreamReader::new(stream));
        write_atomic(&path, |file| async move {
            let mut writer = BufWriter::new(file);
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            Ok(writer.into_inner())
        })
        .await
    }

    async fn get_object(&self, path: &str) -> Result<Option<PayloadStream>> {
        let path = self.path.join(path);
        let file = match OpenOptions::new().read(true).open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path=%path.display(), "object not found");
                return Ok(None);
            }
            Err(err) => return Err(Error::storage(format!("opening {}", path.display()), err)),
        };

        let stream = ReaderStream::new(file);
        Ok(Some(stream.boxed()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.path.join(prefix);
        let result = if prefix.ends_with('/') {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(Error::storage(format!("deleting {}", path.display()), err))
            }
            _ => Ok(()),
        }
    }
}

/// Documents stored as individual files.
///
/// Reads never lock. Writes to the same document are serialized through a lock held only for
/// that document, so writes to different documents never wait for each other.
#[derive(Debug)]
pub struct LocalFsDocumentStore {
    path: PathBuf,
    locks: DocumentLocks,
}

impl LocalFsDocumentStore {
    /// Stores documents below `<path>/documents`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.join("documents"),
            locks: DocumentLocks::default(),
        }
    }

    fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.path
            .join(collection)
            .join(format!("{id}.{DOCUMENT_EXTENSION}"))
    }

    async fn read(&self, path: &Path, id: &str) -> Result<Option<Document>> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::storage(format!("reading {}", path.display()), err)),
        };

        let corrupt = || Error::storage(format!("parsing {}", path.display()), "corrupt document");
        let newline = contents
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(corrupt)?;
        let revision = std::str::from_utf8(&contents[..newline])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(corrupt)?;

        let body = Bytes::from(contents).slice(newline + 1..);
        Ok(Some(Document {
            id: id.to_owned(),
            revision,
            body,
        }))
    }

    async fn write(&self, path: &Path, revision: Revision, body: Bytes) -> Result<()> {
        write_atomic(path, |mut file| async move {
            file.write_all(format!("{revision}\n").as_bytes()).await?;
            file.write_all(&body).await?;
            Ok(file)
        })
        .await
    }
}

#[async_trait::async_trait]
impl DocumentStore for LocalFsDocumentStore {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.read(&self.document_path(collection, id), id).await
    }

    async fn insert(&self, collection: &str, id: &str, body: Bytes) -> Result<Revision> {
        let path = self.document_path(collection, id);
        let _guard = self.locks.lock(&path).await;

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|err| Error::storage(format!("checking {}", path.display()), err))?;
        if exists {
            return Err(Error::InvalidInput(format!(
                "document {collection}/{id} already exists"
            )));
        }

        self.write(&path, 1, body).await?;
        Ok(1)
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        expected: Revision,
        body: Bytes,
    ) -> Result<CasOutcome> {
        let path = self.document_path(collection, id);
        let _guard = self.locks.lock(&path).await;

        let Some(current) = self.read(&path, id).await? else {
            return Ok(CasOutcome::Missing);
        };
        if current.revision != expected {
            return Ok(CasOutcome::Conflict);
        }

        let revision = expected + 1;
        self.write(&path, revision, body).await?;
        Ok(CasOutcome::Swapped(revision))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id);
        let _guard = self.locks.lock(&path).await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::storage(format!("deleting {}", path.display()), err)),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let dir = self.path.join(collection);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::storage(format!("listing {}", dir.display()), err)),
        };

        let mut ids = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|err| Error::storage(format!("listing {}", dir.display()), err))?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_owned());
            }
        }
        ids.sort_unstable();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            // Documents deleted between listing and reading are skipped.
            if let Some(document) = self.read(&self.document_path(collection, &id), &id).await? {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

/// Write locks of the documents currently being modified.
///
/// Entries are created on demand and removed again once the last writer is done.
#[derive(Debug, Default)]
struct DocumentLocks {
    locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    async fn lock(&self, path: &Path) -> DocumentGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_default()
            .clone();

        DocumentGuard {
            locks: self,
            path: path.to_owned(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Holds the write lock of one document.
struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.locks.lock().unwrap();
        if locks
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.path);
        }
    }
}

/// Writes a file next to `path` via `write` and renames it into place once synced.
async fn write_atomic<F, Fut>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(tokio::fs::File) -> Fut,
    Fut: Future<Output = std::io::Result<tokio::fs::File>>,
{
    let storage_error = |err: std::io::Error| Error::storage(format!("writing {}", path.display()), err);

    let parent = path.parent().unwrap_or(path);
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(storage_error)?;

    let temp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await
        .map_err(storage_error)?;

    let result = async {
        let file = write(file).await?;
        file.sync_data().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(err) = result {
        tokio::fs::remove_file(&temp_path).await.ok();
        return Err(storage_error(err));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stream::{make_stream, read_to_vec};

    #[tokio::test]
    async fn stores_and_deletes_objects() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(tempdir.path());

        backend.put_object("chunks/x/0", make_stream(b"oh ")).await.unwrap();
        backend.put_object("chunks/x/1", make_stream(b"hai!")).await.unwrap();

        let stream = backend.get_object("chunks/x/1").await.unwrap().unwrap();
        assert_eq!(read_to_vec(stream).await.unwrap(), b"hai!");

        backend.delete_prefix("chunks/x/").await.unwrap();
        assert!(backend.get_object("chunks/x/0").await.unwrap().is_none());

        // deleting again is fine
        backend.delete_prefix("chunks/x/").await.unwrap();
    }

    #[tokio::test]
    async fn overwrites_objects() {
        let tempdir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(tempdir.path());

        backend.put_object("a", make_stream(b"first")).await.unwrap();
        backend.put_object("a", make_stream(b"second")).await.unwrap();

        let stream = backend.get_object("a").await.unwrap().unwrap();
        assert_eq!(read_to_vec(stream).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsDocumentStore::new(tempdir.path());
        store.insert("videos", "a", "{}".into()).await.unwrap();
        let outcome = store
            .compare_and_swap("videos", "a", 1, r#"{"x":1}"#.into())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Swapped(2));
        drop(store);

        let store = LocalFsDocumentStore::new(tempdir.path());
        let document = store.get("videos", "a").await.unwrap().unwrap();
        assert_eq!(document.revision, 2);
        assert_eq!(document.body, r#"{"x":1}"#);

        let stale = store
            .compare_and_swap("videos", "a", 1, "{}".into())
            .await
            .unwrap();
        assert_eq!(stale, CasOutcome::Conflict);
    }

    #[tokio::test]
    async fn lists_documents_in_id_order() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsDocumentStore::new(tempdir.path());
        assert!(store.list("videos").await.unwrap().is_empty());

        for id in ["c", "a", "b"] {
            store.insert("videos", id, id.to_owned().into()).await.unwrap();
        }
        assert!(store.delete("videos", "c").await.unwrap());
        assert!(!store.delete("videos", "c").await.unwrap());

        let ids: Vec<_> = store
            .list("videos")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn writes_to_other_documents_do_not_wait() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsDocumentStore::new(tempdir.path());

        let held = store.locks.lock(&store.document_path("videos", "busy")).await;
        for i in 0..256 {
            let id = format!("doc-{i}");
            let insert = store.insert("videos", &id, "{}".into());
            tokio::time::timeout(Duration::from_secs(5), insert)
                .await
                .expect("insert blocked by an unrelated document")
                .unwrap();
        }

        drop(held);
        assert_eq!(store.locks.len(), 0);
    }

    #[tokio::test]
    async fn insert_reports_unreadable_collections() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = LocalFsDocumentStore::new(tempdir.path());

        // A file where the collection directory should be.
        std::fs::create_dir_all(tempdir.path().join("documents")).unwrap();
        std::fs::write(tempdir.path().join("documents/videos"), b"").unwrap();

        let err = store.insert("videos", "a", "{}".into()).await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn concurrent_swaps_serialize() {
        let tempdir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(LocalFsDocumentStore::new(tempdir.path()));
        store.insert("docs", "x", "0".into()).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.compare_and_swap("docs", "x", 1, "1".into()).await.unwrap()
                })
            })
            .collect();

        let mut swapped = 0;
        for task in tasks {
            if let CasOutcome::Swapped(_) = task.await.unwrap() {
                swapped += 1;
            }
        }
        assert_eq!(swapped, 1);
    }
}
