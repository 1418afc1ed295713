// src/config.rs
use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

use crate::firestore_store::{
    FirestoreConfig, DEFAULT_DATABASE, DEFAULT_PAGE_SIZE, FIRESTORE_API_BASE_URL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // Store
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,
    pub firestore_project_id: Option<String>,
    pub firestore_api_key: Option<String>,
    #[serde(default = "default_database")]
    pub firestore_database: String,
    #[serde(default = "default_base_url")]
    pub firestore_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Server
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,

    // Sessions
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_base_url() -> String {
    FIRESTORE_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_session_ttl_hours() -> u32 {
    12
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        envy::from_env::<AppConfig>()
    }

    /// Firestore settings, or `None` when no project id is configured.
    pub fn firestore(&self) -> Option<FirestoreConfig> {
        let project_id = self
            .firestore_project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?;
        Some(FirestoreConfig {
            project_id: project_id.to_string(),
            database: self.firestore_database.clone(),
            api_key: self.firestore_api_key.clone().filter(|k| !k.is_empty()),
            base_url: self.firestore_base_url.clone(),
            timeout_secs: self.request_timeout_secs,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Both paths must be set for the server to bind TLS.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.session_ttl_hours))
    }
}
