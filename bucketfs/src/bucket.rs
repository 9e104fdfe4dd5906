use crate::cadapter::client::{
    ContentMeta, FetchedObject, ListRequest, ObjectBackend, ObjectMeta, PutAck, PutSource,
};
use crate::cadapter::transfer::Transfer;
use crate::error::{Error, Result, StoreError};
use crate::handle::{Handle, Node};
use crate::listing;
use crate::path::Path;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::io::Cursor;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A named bucket and the backend that stores its objects. Cheap to clone.
#[derive(Clone)]
pub struct Bucket {
    name: Arc<str>,
    backend: Arc<dyn ObjectBackend>,
}

impl Bucket {
    pub fn new<B: ObjectBackend>(name: impl Into<String>, backend: B) -> Self {
        Self::from_arc(name, Arc::new(backend))
    }

    pub fn from_arc(name: impl Into<String>, backend: Arc<dyn ObjectBackend>) -> Self {
        Self {
            name: Arc::from(name.into()),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    /// Directory handle for the bucket root.
    pub fn root(&self) -> Handle {
        Handle::with_node(self.clone(), Path::root(), Node::Directory)
    }

    /// Looks up the metadata of `key` right away. Fails with
    /// [`Error::NotFound`] when the key does not exist.
    pub async fn file(&self, key: &str) -> Result<Handle> {
        let meta = self.get_object_metadata(key).await?;
        Ok(Handle::with_node(
            self.clone(),
            Path::from_key(key),
            Node::Metadata {
                meta,
                content: None,
            },
        ))
    }

    /// Content and metadata of `key`, uncached. Prefer
    /// [`Handle::get_object`], which keeps what it fetched.
    pub async fn get_object(&self, key: &str) -> Result<FetchedObject> {
        self.backend
            .fetch_object(key)
            .await
            .map_err(|e| self.missing(key, e))
    }

    pub async fn get_object_metadata(&self, key: &str) -> Result<ObjectMeta> {
        self.backend
            .fetch_metadata(key)
            .await
            .map_err(|e| self.missing(key, e))
    }

    pub async fn get_object_as_string(&self, key: &str) -> Result<String> {
        let object = self.get_object(key).await?;
        String::from_utf8(object.content.to_vec()).map_err(|_| Error::Encoding {
            key: key.to_string(),
        })
    }

    pub async fn get_object_as_stream(&self, key: &str) -> Result<Cursor<Bytes>> {
        Ok(Cursor::new(self.get_object(key).await?.content))
    }

    pub async fn put_object(
        &self,
        key: &str,
        source: impl Into<PutSource>,
        meta: Option<ContentMeta>,
    ) -> Result<PutAck> {
        Ok(self.backend.put_object(key, source.into(), meta).await?)
    }

    pub async fn set_object_as_string(&self, key: &str, value: impl Into<String>) -> Result<PutAck> {
        let value: String = value.into();
        self.put_object(key, value, None).await
    }

    pub async fn set_object_as_file(&self, key: &str, file: impl AsRef<FsPath>) -> Result<PutAck> {
        self.put_object(key, file.as_ref().to_path_buf(), None).await
    }

    /// Drains `reader` into a single put.
    pub async fn set_object_as_stream<R>(&self, key: &str, mut reader: R) -> Result<PutAck>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.put_object(key, buf, None).await
    }

    /// Removes `key`. Removing an absent key succeeds, as it does on S3.
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        Ok(self.backend.delete_object(key).await?)
    }

    /// Starts a background upload of `source` to `key`.
    pub fn upload(&self, key: &str, source: impl Into<PutSource>) -> Transfer {
        Arc::clone(&self.backend).begin_upload(key, source.into())
    }

    /// Starts a background download of `key` into `destination`.
    pub fn download(&self, key: &str, destination: impl Into<PathBuf>) -> Transfer {
        Arc::clone(&self.backend).begin_download(key, destination.into())
    }

    /// Every object of the bucket.
    pub fn objects(&self) -> BoxStream<'static, Result<Handle>> {
        self.objects_with(ListRequest::new())
    }

    pub fn objects_with(&self, request: ListRequest) -> BoxStream<'static, Result<Handle>> {
        listing::objects(self.clone(), request)
    }

    fn missing(&self, key: &str, err: StoreError) -> Error {
        if err.is_not_found() {
            Error::NotFound {
                bucket: self.name().to_string(),
                key: key.to_string(),
            }
        } else {
            err.into()
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket").field("name", &self.name).finish()
    }
}
