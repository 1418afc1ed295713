// src/firestore_store.rs

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::firestore_value::{decode_fields, encode_fields, field_path};
use crate::store::{Collection, DocRef, Document, DocumentStore, Fields, StoreError};

pub const FIRESTORE_API_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_PAGE_SIZE: u32 = 300;

#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            api_key: None,
            base_url: FIRESTORE_API_BASE_URL.to_string(),
            timeout_secs: 30,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct WireDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<WireDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: ErrorInformation,
}

#[derive(Debug, Deserialize)]
struct ErrorInformation {
    message: Option<String>,
}

/// Document store backed by the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreStore {
    config: Arc<FirestoreConfig>,
    http_client: Client,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        if config.project_id.trim().is_empty() {
            return Err(StoreError::ConfigError(
                "Firestore project id is empty".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(
            "Firestore store configured for project '{}' (database {})",
            config.project_id, config.database
        );
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database
        )
    }

    fn collection_url(&self, collection: Collection) -> Result<Url, StoreError> {
        let url = Url::parse(&format!("{}/{}", self.documents_root(), collection))?;
        Ok(self.with_key(url))
    }

    fn document_url(&self, collection: Collection, id: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.documents_root())?;
        url.path_segments_mut()
            .map_err(|_| StoreError::ConfigError("base URL cannot hold a path".to_string()))?
            .push(collection.as_str())
            .push(id);
        Ok(self.with_key(url))
    }

    fn with_key(&self, mut url: Url) -> Url {
        if let Some(key) = &self.config.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        url
    }

    fn build_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends the request and returns the JSON body of a success response.
    /// A 404 is reported as `NotFound(doc)`.
    async fn send(&self, request: RequestBuilder, doc: &DocRef) -> Result<Value, StoreError> {
        let request = request.build()?;
        let method = request.method().clone();
        debug!("Firestore {} {}", method, doc);

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!("Firestore request for {} failed: {}", doc, e);
            StoreError::Request(e)
        })?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
        if status == StatusCode::NOT_FOUND {
            warn!("Firestore {} {}: not found", method, doc);
            return Err(StoreError::NotFound(doc.clone()));
        }
        let message = match serde_json::from_str::<ErrorPayload>(&body) {
            Ok(parsed) => parsed.error.message.unwrap_or(body),
            Err(_) => body,
        };
        error!(
            "Firestore API error for {} {}: Status={}, Message='{}'",
            method, doc, status, message
        );
        Err(StoreError::ApiError { status, message })
    }

    fn to_document(&self, wire: WireDocument) -> Result<Document, StoreError> {
        let id = wire
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Document {
            id,
            fields: decode_fields(&wire.fields)?,
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list_all(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        let doc = DocRef::new(collection, "*");

        loop {
            let mut url = self.collection_url(collection)?;
            url.query_pairs_mut()
                .append_pair("pageSize", &self.config.page_size.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let body = self.send(self.build_request(Method::GET, url), &doc).await?;
            let page: ListResponse = serde_json::from_value(body)?;
            debug!(
                "Fetched {} {} documents (more pages: {})",
                page.documents.len(),
                collection,
                page.next_page_token.is_some()
            );
            for wire in page.documents {
                documents.push(self.to_document(wire)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!("Listed {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let doc = DocRef::new(collection, id);
        let url = self.document_url(collection, id)?;
        match self.send(self.build_request(Method::GET, url), &doc).await {
            Ok(body) => {
                let wire: WireDocument = serde_json::from_value(body)?;
                Ok(Some(self.to_document(wire)?))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_one(
        &self,
        collection: Collection,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let url = self.collection_url(collection)?;
        let body = json!({ "fields": encode_fields(&fields) });
        let created = self
            .send(
                self.build_request(Method::POST, url).json(&body),
                &DocRef::new(collection, "(new)"),
            )
            .await?;
        let wire: WireDocument = serde_json::from_value(created)?;
        let document = self.to_document(wire)?;
        info!("Created {}/{}", collection, document.id);
        Ok(document.id)
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        let doc = DocRef::new(collection, id);
        let mut url = self.document_url(collection, id)?;
        {
            let mut query = url.query_pairs_mut();
            for name in fields.keys() {
                query.append_pair("updateMask.fieldPaths", &field_path(name));
            }
            query.append_pair("currentDocument.exists", "true");
        }
        let body = json!({ "fields": encode_fields(&fields) });
        self.send(self.build_request(Method::PATCH, url).json(&body), &doc)
            .await?;
        info!("Updated {} ({} field(s))", doc, fields.len());
        Ok(())
    }

    async fn delete_one(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let doc = DocRef::new(collection, id);
        let mut url = self.document_url(collection, id)?;
        url.query_pairs_mut()
            .append_pair("currentDocument.exists", "true");
        self.send(self.build_request(Method::DELETE, url), &doc)
            .await?;
        info!("Deleted {}", doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        FirestoreStore::new(FirestoreConfig {
            project_id: "demo-project".to_string(),
            api_key: Some("k123".to_string()),
            ..Default::default()
        })
        .expect("config is valid")
    }

    #[test]
    fn empty_project_id_is_rejected() {
        let result = FirestoreStore::new(FirestoreConfig::default());
        assert!(matches!(result, Err(StoreError::ConfigError(_))));
    }

    #[test]
    fn document_urls_carry_collection_id_and_key() {
        let url = store().document_url(Collection::Halls, "abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/halls/abc?key=k123"
        );
    }

    #[test]
    fn wire_document_id_is_last_path_segment() {
        let wire = WireDocument {
            name: "projects/p/databases/(default)/documents/employees/e42".to_string(),
            fields: Map::new(),
        };
        let document = store().to_document(wire).unwrap();
        assert_eq!(document.id, "e42");
        assert!(document.fields.is_empty());
    }

    #[test]
    fn list_page_without_documents_parses() {
        let page: ListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
