// src/store.rs
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Employee, Hall, UserAccount};

/// Top-level field map of a stored document.
pub type Fields = Map<String, Value>;

pub type SharedStore = Arc<dyn DocumentStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Employees,
    Halls,
    Users,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Employees => "employees",
            Collection::Halls => "halls",
            Collection::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `collection/id` of a single document, used to report which writes landed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: Collection,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("document {0} not found")]
    NotFound(DocRef),

    #[error("document store API error: Status={status}, Message='{message}'")]
    ApiError {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("document {doc} could not be decoded: {source}")]
    Decode {
        doc: DocRef,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported stored value: {0}")]
    UnsupportedValue(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("write to {0} rejected")]
    Rejected(DocRef),
}

/// Single-document operations of the remote store. Every call is atomic for
/// its own document only; nothing here spans two documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_all(&self, collection: Collection) -> Result<Vec<Document>, StoreError>;

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Creates a document with a store-generated id and returns that id.
    async fn create_one(&self, collection: Collection, fields: Fields)
        -> Result<String, StoreError>;

    /// Replaces the given top-level fields of an existing document. Fails
    /// with `NotFound` if the document does not exist.
    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError>;

    async fn delete_one(&self, collection: Collection, id: &str) -> Result<(), StoreError>;
}

// --- Typed records ---

/// Maps a typed aggregate to and from stored documents. The id lives in the
/// document name, never in its fields.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn from_document(document: Document) -> Result<Self, StoreError> {
        let Document { id, mut fields } = document;
        fields.insert("id".to_string(), Value::String(id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|source| StoreError::Decode {
            doc: DocRef::new(Self::COLLECTION, id),
            source,
        })
    }

    fn to_fields(&self) -> Result<Fields, StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(fields)
            }
            other => Err(StoreError::UnsupportedValue(format!(
                "{} record serialized to a non-object: {}",
                Self::COLLECTION,
                other
            ))),
        }
    }

    fn doc_ref(&self) -> DocRef {
        DocRef::new(Self::COLLECTION, self.id())
    }
}

impl Record for Employee {
    const COLLECTION: Collection = Collection::Employees;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Hall {
    const COLLECTION: Collection = Collection::Halls;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for UserAccount {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

pub async fn fetch_all<R: Record>(store: &dyn DocumentStore) -> Result<Vec<R>, StoreError> {
    store
        .list_all(R::COLLECTION)
        .await?
        .into_iter()
        .map(R::from_document)
        .collect()
}

pub async fn fetch_one<R: Record>(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<R>, StoreError> {
    match store.get_one(R::COLLECTION, id).await? {
        Some(document) => Ok(Some(R::from_document(document)?)),
        None => Ok(None),
    }
}

/// Picks `names` out of a record's fields for a partial update.
pub fn select_fields<R: Record>(record: &R, names: &[&str]) -> Result<Fields, StoreError> {
    let mut all = record.to_fields()?;
    let mut selected = Fields::new();
    for name in names {
        let value = all.remove(*name).unwrap_or(Value::Null);
        selected.insert((*name).to_string(), value);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_fields_never_carry_the_id() {
        let hall = Hall {
            id: "h1".into(),
            name: "North".into(),
            location: "Haifa".into(),
            ..Default::default()
        };
        let fields = hall.to_fields().unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["name"], json!("North"));
        assert_eq!(hall.doc_ref().to_string(), "halls/h1");
    }

    #[test]
    fn from_document_takes_id_from_the_name() {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!("Dana"));
        fields.insert("id".into(), json!("stale"));
        let employee = Employee::from_document(Document {
            id: "e7".into(),
            fields,
        })
        .unwrap();
        assert_eq!(employee.id, "e7");
        assert_eq!(employee.name, "Dana");
    }

    #[test]
    fn decode_errors_name_the_document() {
        let mut fields = Fields::new();
        fields.insert("attendance".into(), json!("not a map"));
        let err = Employee::from_document(Document {
            id: "e1".into(),
            fields,
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref doc, .. } if doc.id == "e1"));
    }

    #[test]
    fn select_fields_uses_null_for_absent_options() {
        let employee = Employee {
            id: "e1".into(),
            name: "Dana".into(),
            ..Default::default()
        };
        let fields = select_fields(&employee, &["name", "comment"]).unwrap();
        assert_eq!(fields["name"], json!("Dana"));
        assert_eq!(fields["comment"], Value::Null);
    }
}
