//! Per-user API key storage.
//!
//! `Credentials` is the face the conversation flow sees: lookups never fail,
//! they report `Found`, `NotConfigured` or `LookupFailed`, and writes log
//! their own errors. Backends implement `CredentialBackend`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::config::StoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid user id: {0}")]
    InvalidId(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("record has no apikey field")]
    MissingField,
}

/// Result of a credential lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    Found(String),
    NotConfigured,
    LookupFailed(String),
}

impl CredentialLookup {
    pub fn into_secret(self) -> Option<String> {
        match self {
            CredentialLookup::Found(secret) => Some(secret),
            CredentialLookup::NotConfigured | CredentialLookup::LookupFailed(_) => None,
        }
    }
}

#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Read the stored key, `Ok(None)` when the user has no record.
    async fn load(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Replace the user's record with `secret`.
    async fn save(&self, user_id: &str, secret: &str) -> Result<(), StoreError>;
}

/// Error-swallowing front for a credential backend.
#[derive(Clone)]
pub struct Credentials {
    backend: Arc<dyn CredentialBackend>,
}

impl Credentials {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend named by the config.
    pub fn from_config(store: &StoreConfig, http: reqwest::Client) -> Self {
        let backend: Arc<dyn CredentialBackend> = match store {
            StoreConfig::Memory => Arc::new(MemoryBackend::new()),
            StoreConfig::File { path } => Arc::new(FileBackend::new(path.clone())),
            StoreConfig::Firestore {
                project_id,
                collection,
                base_url,
                access_token,
            } => Arc::new(FirestoreBackend {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                project_id: project_id.clone(),
                collection: collection.clone(),
                access_token: access_token.clone(),
            }),
        };
        Self::new(backend)
    }

    pub async fn get(&self, user_id: &str) -> CredentialLookup {
        match self.backend.load(user_id).await {
            Ok(Some(secret)) if !secret.is_empty() => CredentialLookup::Found(secret),
            Ok(_) => CredentialLookup::NotConfigured,
            Err(e) => {
                warn!("Credential lookup failed for user {}: {}", user_id, e);
                CredentialLookup::LookupFailed(e.to_string())
            }
        }
    }

    pub async fn set(&self, user_id: &str, secret: &str) {
        if let Err(e) = self.backend.save(user_id, secret).await {
            error!("Failed to save credential for user {}: {}", user_id, e);
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialRecord {
    apikey: String,
}

/// Reject ids that could escape a directory or a document collection.
fn check_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.is_empty() {
        return Err(StoreError::InvalidId("user id cannot be empty".to_string()));
    }
    if user_id == "."
        || user_id.contains('/')
        || user_id.contains('\\')
        || user_id.contains("..")
        || user_id.chars().any(|c| c.is_control())
    {
        return Err(StoreError::InvalidId(format!(
            "user id contains invalid characters: {user_id:?}"
        )));
    }
    Ok(())
}

// ── Memory ──

/// In-memory storage for testing and local development.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
    async fn load(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, secret: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), secret.to_string());
        Ok(())
    }
}

// ── File ──

/// One `<user_id>.json` document per user.
pub struct FileBackend {
    base_path: PathBuf,
}

impl FileBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn record_path(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        check_user_id(user_id)?;
        Ok(self.base_path.join(format!("{}.json", user_id)))
    }
}

#[async_trait]
impl CredentialBackend for FileBackend {
    async fn load(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(user_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CredentialRecord = serde_json::from_str(&content)?;
        Ok(Some(record.apikey))
    }

    async fn save(&self, user_id: &str, secret: &str) -> Result<(), StoreError> {
        let path = self.record_path(user_id)?;
        tokio::fs::create_dir_all(&self.base_path).await?;
        let content = serde_json::to_string_pretty(&CredentialRecord {
            apikey: secret.to_string(),
        })?;
        // Write then rename so readers never see a half-written record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

// ── Firestore ──

/// Firestore caps document ids at 1500 bytes.
const FIRESTORE_MAX_ID_BYTES: usize = 1500;

/// Firestore REST v1 document per user: `{collection}/{user_id}`.
pub struct FirestoreBackend {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    collection: String,
    access_token: Option<String>,
}

impl FirestoreBackend {
    fn document_url(&self, user_id: &str) -> Result<String, StoreError> {
        check_user_id(user_id)?;
        // `__name__` style ids are reserved
        let reserved = user_id.len() >= 4 && user_id.starts_with("__") && user_id.ends_with("__");
        if reserved || user_id.len() > FIRESTORE_MAX_ID_BYTES {
            return Err(StoreError::InvalidId(format!(
                "not a valid document id: {user_id:?}"
            )));
        }
        Ok(format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.base_url, self.project_id, self.collection, user_id
        ))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Pull `fields.apikey.stringValue` out of a Firestore document.
fn apikey_from_document(doc: &serde_json::Value) -> Result<String, StoreError> {
    doc.get("fields")
        .and_then(|f| f.get("apikey"))
        .and_then(|v| v.get("stringValue"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or(StoreError::MissingField)
}

fn document_body(secret: &str) -> serde_json::Value {
    json!({ "fields": { "apikey": { "stringValue": secret } } })
}

#[async_trait]
impl CredentialBackend for FirestoreBackend {
    async fn load(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let url = self.document_url(user_id)?;
        let response = self.authorized(self.http.get(&url)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }
        let doc: serde_json::Value = response.json().await?;
        apikey_from_document(&doc).map(Some)
    }

    async fn save(&self, user_id: &str, secret: &str) -> Result<(), StoreError> {
        let url = self.document_url(user_id)?;
        // No updateMask: the stored document is replaced, not merged
        let response = self
            .authorized(self.http.patch(&url))
            .json(&document_body(secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }
        Ok(())
    }
}
