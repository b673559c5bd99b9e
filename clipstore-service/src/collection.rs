//! Typed JSON collections on top of the [`DocumentStore`](crate::backend::DocumentStore).

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{CasOutcome, Document};
use crate::error::{Error, Result};
use crate::service::StorageEngine;

/// How often an optimistic update is attempted before giving up with [`Error::Contention`].
const MAX_UPDATE_ATTEMPTS: usize = 256;

/// A collection of JSON documents of type `T`.
pub(crate) struct Collection<T> {
    engine: StorageEngine,
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            name: self.name,
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(engine: StorageEngine, name: &'static str) -> Self {
        Self {
            engine,
            name,
            _type: PhantomData,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let document = self.engine.documents().get(self.name, id).await?;
        document.map(|d| self.decode(&d)).transpose()
    }

    pub async fn insert(&self, id: &str, value: &T) -> Result<()> {
        let body = self.encode(id, value)?;
        self.engine.documents().insert(self.name, id, body).await?;
        Ok(())
    }

    /// Atomically applies `mutate` to the document with the given id.
    ///
    /// The closure may run several times if concurrent writers modify the document in between;
    /// it must only touch the value it is given. Returning `Ok(false)` signals that the value is
    /// unchanged, in which case nothing is written. Errors from the closure abort the update.
    pub async fn update<F>(&self, id: &str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut T) -> Result<bool>,
    {
        let documents = self.engine.documents();

        for attempt in 0..MAX_UPDATE_ATTEMPTS {
            let Some(document) = documents.get(self.name, id).await? else {
                return Err(Error::NotFound);
            };

            let mut value = self.decode(&document)?;
            if !mutate(&mut value)? {
                return Ok(value);
            }

            let body = self.encode(id, &value)?;
            match documents
                .compare_and_swap(self.name, id, document.revision, body)
                .await?
            {
                CasOutcome::Swapped(_) => return Ok(value),
                CasOutcome::Missing => return Err(Error::NotFound),
                CasOutcome::Conflict => {
                    tracing::trace!(collection = self.name, id, attempt, "update conflict");
                    tokio::task::yield_now().await;
                }
            }
        }

        tracing::warn!(collection = self.name, id, "giving up on contended update");
        Err(Error::Contention(format!("{}/{id}", self.name)))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.engine.documents().delete(self.name, id).await
    }

    pub async fn list(&self) -> Result<Vec<T>> {
        let documents = self.engine.documents().list(self.name).await?;
        documents.iter().map(|d| self.decode(d)).collect()
    }

    fn decode(&self, document: &Document) -> Result<T> {
        serde_json::from_slice(&document.body).map_err(|cause| Error::Serde {
            context: format!("decoding {}/{}", self.name, document.id),
            cause,
        })
    }

    fn encode(&self, id: &str, value: &T) -> Result<bytes::Bytes> {
        let body = serde_json::to_vec(value).map_err(|cause| Error::Serde {
            context: format!("encoding {}/{id}", self.name),
            cause,
        })?;
        Ok(body.into())
    }
}
