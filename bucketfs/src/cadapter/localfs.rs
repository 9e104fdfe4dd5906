//! Local directory backend: mocks an object store with plain files.
//!
//! A key `a/b/c.txt` lives at `<root>/a/b/c.txt`. Empty directories left
//! behind by deletes are pruned so they do not show up as pseudo-directories.

use super::client::{
    ContentMeta, FetchedObject, ListPage, ListRequest, ObjectBackend, ObjectMeta, ObjectSummary,
    PutAck, PutSource,
};
use super::memory::DEFAULT_PAGE_SIZE;
use super::paging::page_of;
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::{fs, io::AsyncWriteExt};
use tracing::trace;

pub struct LocalFsBackend {
    root: PathBuf,
    page_size: usize,
}

impl LocalFsBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Maps a key below the root. Keys that would leave the root (absolute
    /// keys, `.` or `..` segments, empty segments) are rejected.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => {
                    return Err(StoreError::InvalidKey {
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(path)
    }

    /// Directory holding every key that starts with `prefix`: the prefix up
    /// to its last separator.
    fn dir_for_prefix(&self, prefix: &str) -> Result<PathBuf, StoreError> {
        match prefix.rfind('/') {
            Some(pos) => self.path_for(&prefix[..pos]),
            None => Ok(self.root.clone()),
        }
    }

    fn not_found(key: &str) -> StoreError {
        StoreError::NoSuchKey {
            key: key.to_string(),
        }
    }

    /// Metadata of the file behind `key`; directories count as absent.
    async fn stat(&self, key: &str) -> Result<(PathBuf, Metadata), StoreError> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(md) if md.is_file() => Ok((path, md)),
            Ok(_) => Err(Self::not_found(key)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn meta_for(key: &str, md: &Metadata) -> Result<ObjectMeta, StoreError> {
        Ok(ObjectMeta {
            key: key.to_string(),
            etag: etag_for(md)?,
            size: md.len(),
            last_modified: DateTime::<Utc>::from(md.modified()?),
            content_type: None,
        })
    }

    /// Removes now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    /// Every file below `dir` as a sorted list of summaries.
    async fn scan(&self, dir: PathBuf) -> Result<Vec<ObjectSummary>, StoreError> {
        let mut out = Vec::new();
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut rd = match fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = rd.next_entry().await? {
                let ft = entry.file_type().await?;
                let path = entry.path();
                if ft.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                let md = entry.metadata().await?;
                out.push(ObjectSummary {
                    key,
                    etag: etag_for(&md)?,
                    size: md.len(),
                    last_modified: DateTime::<Utc>::from(md.modified()?),
                });
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel.iter().map(|c| c.to_str()).collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

/// Etag derived from size and modification time, so listings never read
/// file contents.
fn etag_for(md: &Metadata) -> Result<String, StoreError> {
    let modified = md
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let stamp = format!("{}:{modified}", md.len());
    Ok(hex::encode(md5::compute(stamp.as_bytes()).0))
}

#[async_trait]
impl ObjectBackend for LocalFsBackend {
    async fn fetch_object(&self, key: &str) -> Result<FetchedObject, StoreError> {
        let (path, md) = self.stat(key).await?;
        let data = fs::read(&path).await?;
        Ok(FetchedObject {
            meta: Self::meta_for(key, &md)?,
            content: Bytes::from(data),
        })
    }

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let (_, md) = self.stat(key).await?;
        Self::meta_for(key, &md)
    }

    async fn put_object(
        &self,
        key: &str,
        source: PutSource,
        _meta: Option<ContentMeta>,
    ) -> Result<PutAck, StoreError> {
        let path = self.path_for(key)?;
        let data = source.into_bytes().await?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut f = fs::File::create(&path).await?;
        f.write_all(&data).await?;
        f.flush().await?;
        let md = fs::metadata(&path).await?;
        trace!(key, size = data.len(), "wrote local object");
        Ok(PutAck {
            etag: Some(etag_for(&md)?),
            size: Some(md.len()),
            last_modified: Some(DateTime::<Utc>::from(md.modified()?)),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            // deleting an absent key is not an error for object stores
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_parents(&path).await;
        Ok(())
    }

    async fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        let dir = match request.prefix.as_deref() {
            Some(prefix) => match self.dir_for_prefix(prefix) {
                Ok(dir) => dir,
                // no stored key can start with an invalid prefix
                Err(StoreError::InvalidKey { .. }) => return Ok(ListPage::default()),
                Err(e) => return Err(e),
            },
            None => self.root.clone(),
        };
        let entries = self.scan(dir).await?;
        Ok(page_of(entries, request, self.page_size))
    }
}
