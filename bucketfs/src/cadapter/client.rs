//! Object backend API consumed by the handle layer.
//!
//! A backend is a flat key/value store with delimiter-based listings. Every
//! call may fail; "key does not exist" must be reported as
//! [`StoreError::NoSuchKey`] so the handle layer can cache the absence.

use super::transfer::Transfer;
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Metadata returned by a single-object fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// Content plus metadata of one object.
#[derive(Clone, Debug)]
pub struct FetchedObject {
    pub meta: ObjectMeta,
    pub content: Bytes,
}

/// One object as reported by a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Write acknowledgement. Which fields are populated depends on the backend:
/// S3 for instance reports an etag but neither size nor modification time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutAck {
    pub etag: Option<String>,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Optional content metadata sent along with a write.
#[derive(Clone, Debug, Default)]
pub struct ContentMeta {
    pub content_type: Option<String>,
}

/// Where the bytes of a write come from.
#[derive(Clone, Debug)]
pub enum PutSource {
    Bytes(Bytes),
    File(PathBuf),
}

impl PutSource {
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            PutSource::Bytes(b) => Ok(b),
            PutSource::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

impl From<Bytes> for PutSource {
    fn from(b: Bytes) -> Self {
        PutSource::Bytes(b)
    }
}

impl From<Vec<u8>> for PutSource {
    fn from(v: Vec<u8>) -> Self {
        PutSource::Bytes(Bytes::from(v))
    }
}

impl From<String> for PutSource {
    fn from(s: String) -> Self {
        PutSource::Bytes(Bytes::from(s))
    }
}

impl From<&str> for PutSource {
    fn from(s: &str) -> Self {
        PutSource::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<PathBuf> for PutSource {
    fn from(p: PathBuf) -> Self {
        PutSource::File(p)
    }
}

/// Shape of a listing request; unset fields fall back to the backend defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Only keys strictly after this one are returned (S3 "marker"/"start-after").
    pub start_after: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<u32>,
}

impl ListRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_start_after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    pub fn with_max_keys(mut self, max_keys: u32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// One page of a listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Direct child pseudo-directories, each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[async_trait]
pub trait ObjectBackend: Send + Sync + 'static {
    async fn fetch_object(&self, key: &str) -> Result<FetchedObject, StoreError>;

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectMeta, StoreError>;

    async fn put_object(
        &self,
        key: &str,
        source: PutSource,
        meta: Option<ContentMeta>,
    ) -> Result<PutAck, StoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// Returns a single page; callers follow `next_continuation_token`.
    async fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError>;

    /// Single-level listing below `prefix` grouped by `delimiter`.
    async fn list_one_level(
        &self,
        prefix: Option<&str>,
        delimiter: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let request = ListRequest {
            prefix: prefix.map(str::to_string),
            delimiter: Some(delimiter.to_string()),
            continuation_token: continuation_token.map(str::to_string),
            ..ListRequest::default()
        };
        self.list(&request).await
    }

    /// Starts a background upload. Backends with a faster path (multipart,
    /// parallel parts) override this.
    fn begin_upload(self: Arc<Self>, key: &str, source: PutSource) -> Transfer {
        let key = key.to_string();
        Transfer::spawn(key.clone(), async move {
            self.put_object(&key, source, None).await.map(|_| ())
        })
    }

    fn begin_download(self: Arc<Self>, key: &str, destination: PathBuf) -> Transfer {
        let key = key.to_string();
        Transfer::spawn(key.clone(), async move {
            let object = self.fetch_object(&key).await?;
            if let Some(dir) = destination.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let mut f = tokio::fs::File::create(&destination).await?;
            f.write_all(&object.content).await?;
            f.flush().await?;
            Ok(())
        })
    }
}
