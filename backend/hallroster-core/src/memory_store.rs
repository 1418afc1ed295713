// src/memory_store.rs
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::store::{Collection, DocRef, Document, DocumentStore, Fields, StoreError};

const GENERATED_ID_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub doc: DocRef,
}

/// Process-local document store. Used as the `memory` backend and as the
/// store double in tests: it records every successful write and can be told
/// to reject writes to chosen documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<Collection, BTreeMap<String, Fields>>>>,
    write_log: Arc<Mutex<Vec<WriteRecord>>>,
    failing_docs: Arc<Mutex<HashSet<DocRef>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn check_writable(&self, doc: &DocRef) -> Result<(), StoreError> {
        if self.failing_docs.lock().await.contains(doc) {
            warn!("Injected write failure for {}", doc);
            return Err(StoreError::Rejected(doc.clone()));
        }
        Ok(())
    }

    async fn record(&self, op: WriteOp, doc: DocRef) {
        debug!("Memory store {:?} {}", op, doc);
        self.write_log.lock().await.push(WriteRecord { op, doc });
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Inserts a document under a caller-chosen id, bypassing the write log.
    pub async fn seed(&self, collection: Collection, id: &str, fields: Fields) {
        self.collections
            .lock()
            .await
            .entry(collection)
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub async fn fail_writes_to(&self, collection: Collection, id: &str) {
        self.failing_docs
            .lock()
            .await
            .insert(DocRef::new(collection, id));
    }

    pub async fn clear_failures(&self) {
        self.failing_docs.lock().await.clear();
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.write_log.lock().await.clone()
    }

    pub async fn clear_writes(&self) {
        self.write_log.lock().await.clear();
    }
}

fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_all(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn create_one(
        &self,
        collection: Collection,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let id = generate_id();
        let doc = DocRef::new(collection, id.clone());
        self.check_writable(&doc).await?;
        self.collections
            .lock()
            .await
            .entry(collection)
            .or_default()
            .insert(id.clone(), fields);
        self.record(WriteOp::Create, doc).await;
        Ok(id)
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let doc = DocRef::new(collection, id);
        self.check_writable(&doc).await?;
        {
            let mut collections = self.collections.lock().await;
            let existing = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound(doc.clone()))?;
            for (name, value) in fields {
                existing.insert(name, value);
            }
        }
        self.record(WriteOp::Update, doc).await;
        Ok(())
    }

    async fn delete_one(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let doc = DocRef::new(collection, id);
        self.check_writable(&doc).await?;
        let removed = self
            .collections
            .lock()
            .await
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            return Err(StoreError::NotFound(doc));
        }
        self.record(WriteOp::Delete, doc).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_then_update_merges_top_level_fields() {
        let store = MemoryStore::new();
        let id = store
            .create_one(
                Collection::Halls,
                fields(&[("name", json!("North")), ("location", json!("Haifa"))]),
            )
            .await
            .unwrap();
        assert_eq!(id.len(), GENERATED_ID_LEN);

        store
            .update_fields(Collection::Halls, &id, fields(&[("name", json!("South"))]))
            .await
            .unwrap();

        let doc = store.get_one(Collection::Halls, &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("South"));
        assert_eq!(doc.fields["location"], json!("Haifa"));
        assert_eq!(store.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_fields(Collection::Employees, "ghost", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn injected_failures_reject_only_the_chosen_document() {
        let store = MemoryStore::new();
        store.seed(Collection::Halls, "h1", Fields::new()).await;
        store.seed(Collection::Halls, "h2", Fields::new()).await;
        store.fail_writes_to(Collection::Halls, "h1").await;

        let err = store
            .update_fields(Collection::Halls, "h1", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        store
            .update_fields(Collection::Halls, "h2", Fields::new())
            .await
            .unwrap();

        store.clear_failures().await;
        store
            .update_fields(Collection::Halls, "h1", Fields::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_removes_from_listing() {
        let store = MemoryStore::new();
        store.seed(Collection::Users, "u1", Fields::new()).await;
        store.delete_one(Collection::Users, "u1").await.unwrap();
        assert!(store.list_all(Collection::Users).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_one(Collection::Users, "u1").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
