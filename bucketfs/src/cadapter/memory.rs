//! In-memory object backend for local development and tests.

use super::client::{
    ContentMeta, FetchedObject, ListPage, ListRequest, ObjectBackend, ObjectMeta, ObjectSummary,
    PutAck, PutSource,
};
use super::paging::page_of;
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// S3 returns at most this many entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    content: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
}

impl StoredObject {
    fn meta(&self, key: &str) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            etag: self.etag.clone(),
            size: self.content.len() as u64,
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
        }
    }

    fn summary(&self, key: &str) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            etag: self.etag.clone(),
            size: self.content.len() as u64,
            last_modified: self.last_modified,
        }
    }
}

/// Per-operation call counters, handy for asserting how often the handle
/// layer reached the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpStats {
    pub fetch_object: usize,
    pub fetch_metadata: usize,
    pub put_object: usize,
    pub delete_object: usize,
    pub list: usize,
}

#[derive(Default)]
struct Counters {
    fetch_object: AtomicUsize,
    fetch_metadata: AtomicUsize,
    put_object: AtomicUsize,
    delete_object: AtomicUsize,
    list: AtomicUsize,
}

/// Keeps every object in a sorted map.
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
    latency: Option<Duration>,
    unavailable: RwLock<HashSet<String>>,
    counters: Counters,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
            unavailable: RwLock::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    /// Limits how many entries a listing page may hold.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delays every fetch and put, which widens race windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds an object without going through the counters.
    pub fn insert(&self, key: impl Into<String>, content: impl Into<Bytes>) {
        let content = content.into();
        let stored = StoredObject {
            etag: etag_of(&content),
            content,
            last_modified: Utc::now(),
            content_type: None,
        };
        self.write().insert(key.into(), stored);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Makes every operation on `key` fail with a backend error until cleared.
    pub fn set_unavailable(&self, key: &str, unavailable: bool) {
        let mut set = self
            .unavailable
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if unavailable {
            set.insert(key.to_string());
        } else {
            set.remove(key);
        }
    }

    pub fn stats(&self) -> OpStats {
        OpStats {
            fetch_object: self.counters.fetch_object.load(Ordering::SeqCst),
            fetch_metadata: self.counters.fetch_metadata.load(Ordering::SeqCst),
            put_object: self.counters.put_object.load(Ordering::SeqCst),
            delete_object: self.counters.delete_object.load(Ordering::SeqCst),
            list: self.counters.list.load(Ordering::SeqCst),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self, key: &str) -> Result<(), StoreError> {
        let set = self
            .unavailable
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if set.contains(key) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "backend unavailable for {key}"
            ))));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lookup(&self, key: &str) -> Result<StoredObject, StoreError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey {
                key: key.to_string(),
            })
    }
}

pub(crate) fn etag_of(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn fetch_object(&self, key: &str) -> Result<FetchedObject, StoreError> {
        self.counters.fetch_object.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_available(key)?;
        let stored = self.lookup(key)?;
        Ok(FetchedObject {
            meta: stored.meta(key),
            content: stored.content,
        })
    }

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.counters.fetch_metadata.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_available(key)?;
        Ok(self.lookup(key)?.meta(key))
    }

    async fn put_object(
        &self,
        key: &str,
        source: PutSource,
        meta: Option<ContentMeta>,
    ) -> Result<PutAck, StoreError> {
        self.counters.put_object.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_available(key)?;
        let content = source.into_bytes().await?;
        let stored = StoredObject {
            etag: etag_of(&content),
            content,
            last_modified: Utc::now(),
            content_type: meta.and_then(|m| m.content_type),
        };
        let ack = PutAck {
            etag: Some(stored.etag.clone()),
            size: Some(stored.content.len() as u64),
            last_modified: Some(stored.last_modified),
        };
        self.write().insert(key.to_string(), stored);
        Ok(ack)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.counters.delete_object.fetch_add(1, Ordering::SeqCst);
        self.check_available(key)?;
        self.write().remove(key);
        Ok(())
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        if let Some(prefix) = request.prefix.as_deref() {
            self.check_available(prefix)?;
        }
        let map = self.read();
        let entries = map.iter().map(|(k, v)| v.summary(k));
        Ok(page_of(entries, request, self.page_size))
    }
}
