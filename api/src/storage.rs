//! Object storage for book sources, extracted chapters and podcast audio.
//!
//! Two backends: Google Cloud Storage for deployments and a plain directory
//! (`LOCAL_STORAGE_PATH`) for local development. Objects are addressed as
//! `gs://bucket/name` references in the database either way.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_storage::client::Storage;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object reference: {0}")]
    InvalidUri(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("GCS error: {0}")]
    Gcs(String),

    #[error("local storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Parse a `gs://bucket/path/to/object` reference.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| StorageError::InvalidUri(uri.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, name)) if !bucket.is_empty() && !name.is_empty() => {
                Ok(Self::new(bucket, name))
            }
            _ => Err(StorageError::InvalidUri(uri.to_string())),
        }
    }

    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub metadata: Vec<(String, String)>,
}

impl UploadOptions {
    pub fn content_type(content_type: &str) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            metadata: Vec::new(),
        }
    }

    pub fn tag(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `data` under `name` in the configured bucket.
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<ObjectRef, StorageError>;

    async fn download(&self, object: &ObjectRef) -> Result<Bytes, StorageError>;

    /// Public HTTP URL of an object (the bucket grants public read).
    fn public_url(&self, object: &ObjectRef) -> String;
}

pub struct GcsStore {
    client: Storage,
    bucket: String,
    public_base_url: String,
}

impl GcsStore {
    pub fn new(client: Storage, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<ObjectRef, StorageError> {
        let bucket = format!("projects/_/buckets/{}", self.bucket);
        let mut request = self.client.write_object(&bucket, name, data);
        if let Some(content_type) = options.content_type {
            request = request.set_content_type(content_type);
        }
        if !options.metadata.is_empty() {
            request = request.set_metadata(options.metadata);
        }
        request
            .send_buffered()
            .await
            .map_err(|e| StorageError::Gcs(format!("write {name} failed: {e}")))?;

        tracing::info!(bucket = %self.bucket, object = %name, "Uploaded object");
        Ok(ObjectRef::new(self.bucket.clone(), name))
    }

    async fn download(&self, object: &ObjectRef) -> Result<Bytes, StorageError> {
        let bucket = format!("projects/_/buckets/{}", object.bucket);
        let mut resp = self
            .client
            .read_object(&bucket, &object.name)
            .send()
            .await
            .map_err(|e| StorageError::Gcs(format!("read {object} failed: {e}")))?;

        let mut data = Vec::new();
        while let Some(chunk) = resp.next().await {
            let chunk = chunk.map_err(|e| StorageError::Gcs(format!("stream {object}: {e}")))?;
            data.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(data))
    }

    fn public_url(&self, object: &ObjectRef) -> String {
        format!("{}/{}/{}", self.public_base_url, object.bucket, object.name)
    }
}

/// Sidecar written next to each object on disk, `<name>.meta.json`
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DiskMetadata {
    content_type: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl From<UploadOptions> for DiskMetadata {
    fn from(options: UploadOptions) -> Self {
        Self {
            content_type: options.content_type,
            metadata: options.metadata.into_iter().collect(),
        }
    }
}

/// Directory-backed store for local development and tests.
pub struct DiskStore {
    root: PathBuf,
    bucket: String,
    public_base_url: String,
}

impl DiskStore {
    pub fn new(root: PathBuf, bucket: String, public_base_url: String) -> Self {
        Self {
            root,
            bucket,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<ObjectRef, StorageError> {
        let full_path = self.root.join(name);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, &data).await?;

        let sidecar = serde_json::to_vec_pretty(&DiskMetadata::from(options))
            .map_err(std::io::Error::other)?;
        tokio::fs::write(self.root.join(format!("{name}.meta.json")), sidecar).await?;
        tracing::debug!(path = ?full_path, "Saved object to local storage");
        Ok(ObjectRef::new(self.bucket.clone(), name))
    }

    async fn download(&self, object: &ObjectRef) -> Result<Bytes, StorageError> {
        let full_path = self.root.join(&object.name);
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(object.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, object: &ObjectRef) -> String {
        format!("{}/{}/{}", self.public_base_url, object.bucket, object.name)
    }
}
