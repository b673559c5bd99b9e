//! Free-form administrator profiles.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::service::StorageEngine;

const COLLECTION: &str = "admin";

/// Stores arbitrary JSON objects describing administrators.
#[derive(Clone, Debug)]
pub struct AdminRepository {
    entries: Collection<Map<String, Value>>,
}

impl AdminRepository {
    /// Creates a repository on top of the given engine.
    pub fn new(engine: StorageEngine) -> Self {
        Self {
            entries: Collection::new(engine, COLLECTION),
        }
    }

    /// Stores a JSON object and returns its generated id.
    ///
    /// The id is also written into the object's `id` field, replacing any value supplied by
    /// the caller.
    pub async fn insert(&self, value: Value) -> Result<Uuid> {
        let Value::Object(mut entry) = value else {
            return Err(Error::InvalidInput("admin entry must be an object".into()));
        };

        let id = Uuid::now_v7();
        entry.insert("id".into(), Value::String(id.to_string()));
        self.entries.insert(&id.to_string(), &entry).await?;
        Ok(id)
    }

    /// Returns the oldest stored entry.
    pub async fn first(&self) -> Result<Option<Map<String, Value>>> {
        Ok(self.entries.list().await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn returns_oldest_entry() {
        let admin = AdminRepository::new(StorageEngine::in_memory());
        assert_eq!(admin.first().await.unwrap(), None);

        let id = admin.insert(json!({"email": "first@example.com"})).await.unwrap();
        admin.insert(json!({"email": "second@example.com"})).await.unwrap();

        let first = admin.first().await.unwrap().unwrap();
        assert_eq!(first["email"], "first@example.com");
        assert_eq!(first["id"], id.to_string());
    }

    #[tokio::test]
    async fn rejects_non_objects() {
        let admin = AdminRepository::new(StorageEngine::in_memory());
        let err = admin.insert(json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
