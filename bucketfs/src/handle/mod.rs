//! Stable references to keys of a bucket.
//!
//! A [`Handle`] keeps one logical reference to a key across its whole life:
//! before it exists, right after it was written, after it was overwritten or
//! deleted. What the handle knows about the key lives in a single
//! atomically swapped node cell. Every transition is a compare-and-swap
//! against the node captured before the store call, so a caller that loses a
//! race adopts the winner's state instead of overwriting it.

mod node;
mod writer;

pub use node::NodeKind;
pub use writer::ValueWriter;

pub(crate) use node::Node;

use crate::bucket::Bucket;
use crate::cadapter::client::{FetchedObject, ListRequest, ObjectSummary, PutSource};
use crate::cadapter::transfer::{Transfer, TransferState};
use crate::error::{Error, Result, StoreError};
use crate::path::{Path, SEPARATOR};
use crate::walk::{self, UNBOUNDED};
use arc_swap::{ArcSwap, Guard};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

/// A reference to one key of a bucket.
///
/// Cloning a handle shares its cache: both clones observe the same state.
/// Handles obtained separately for the same key (two `get_file` calls, a
/// listing and a navigation) each carry their own cache. Equality and
/// hashing only look at the path.
#[derive(Clone)]
pub struct Handle {
    bucket: Bucket,
    path: Path,
    node: Arc<ArcSwap<Node>>,
}

impl Handle {
    pub(crate) fn with_node(bucket: Bucket, path: Path, node: Node) -> Self {
        Self {
            bucket,
            path,
            node: Arc::new(ArcSwap::from_pointee(node)),
        }
    }

    pub(crate) fn from_summary(bucket: &Bucket, summary: ObjectSummary) -> Self {
        let path = Path::from_key(&summary.key);
        Self::with_node(bucket.clone(), path, Node::ListingSummary(summary))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn absolute_name(&self) -> &str {
        self.path.absolute_name()
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }

    /// The cached state, without touching the store.
    pub fn state(&self) -> NodeKind {
        self.node.load().kind()
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.settled().await?.exists())
    }

    pub async fn is_file(&self) -> Result<bool> {
        Ok(self.settled().await?.is_object())
    }

    pub async fn is_directory(&self) -> Result<bool> {
        Ok(matches!(*self.settled().await?, Node::Directory))
    }

    /// The enclosing pseudo-directory, `None` for the bucket root.
    pub fn get_parent(&self) -> Option<Handle> {
        let parent = self.path.parent()?;
        Some(Handle::with_node(self.bucket.clone(), parent, Node::Directory))
    }

    /// Derives a child handle. The child starts out `Unknown` unless `name`
    /// ends with the separator, which marks it as a directory.
    pub fn get_file(&self, name: &str) -> Result<Handle> {
        if self.node.load().is_object() {
            return Err(Error::NotADirectory {
                path: self.path.absolute_name().to_string(),
                child: Some(name.to_string()),
            });
        }
        let node = if name.ends_with(SEPARATOR) {
            Node::Directory
        } else {
            Node::Unknown
        };
        Ok(Handle::with_node(
            self.bucket.clone(),
            self.path.child(name),
            node,
        ))
    }

    /// Content and metadata, fetched once and cached afterwards.
    pub async fn get_object(&self) -> Result<FetchedObject> {
        let mut node = self.node.load_full();
        loop {
            match &*node {
                Node::Directory => return Err(self.is_directory_error()),
                Node::NewObject => return Err(self.not_found()),
                Node::Metadata {
                    meta,
                    content: Some(content),
                } => {
                    return Ok(FetchedObject {
                        meta: meta.clone(),
                        content: content.clone(),
                    });
                }
                _ => node = self.resolve(&node).await?,
            }
        }
    }

    pub async fn get_value(&self) -> Result<Bytes> {
        Ok(self.get_object().await?.content)
    }

    pub async fn get_value_as_string(&self) -> Result<String> {
        let content = self.get_value().await?;
        String::from_utf8(content.to_vec()).map_err(|_| Error::Encoding {
            key: self.path.absolute_name().to_string(),
        })
    }

    /// Readable view over the content; implements both `std::io::Read` and
    /// `tokio::io::AsyncRead`.
    pub async fn get_value_as_stream(&self) -> Result<Cursor<Bytes>> {
        Ok(Cursor::new(self.get_value().await?))
    }

    pub async fn get_etag(&self) -> Result<String> {
        self.read_attr(Node::etag).await
    }

    pub async fn get_size(&self) -> Result<u64> {
        self.read_attr(Node::size).await
    }

    pub async fn get_last_modified(&self) -> Result<DateTime<Utc>> {
        self.read_attr(Node::last_modified).await
    }

    pub async fn set_value_as_string(&self, value: impl Into<String>) -> Result<()> {
        self.write_and_replace(PutSource::from(value.into())).await
    }

    pub async fn set_value_as_bytes(&self, value: impl Into<Bytes>) -> Result<()> {
        self.write_and_replace(PutSource::Bytes(value.into())).await
    }

    pub async fn set_value_as_file(&self, file: impl AsRef<FsPath>) -> Result<()> {
        self.write_and_replace(PutSource::File(file.as_ref().to_path_buf()))
            .await
    }

    /// Drains `reader` and stores everything in a single put.
    pub async fn set_value_from_reader<R>(&self, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.write_and_replace(PutSource::from(buf)).await
    }

    /// Opens a writer whose content becomes the value once it is shut down
    /// or finished. See [`ValueWriter`].
    pub fn set_value_as_stream(&self) -> Result<ValueWriter> {
        if matches!(**self.node.load(), Node::Directory) {
            return Err(self.is_directory_error());
        }
        Ok(ValueWriter::new(self.clone()))
    }

    /// Removes the object. Deleting a directory or a key known to be
    /// absent is an error.
    pub async fn delete(&self) -> Result<()> {
        let node = self.settled().await?;
        match &*node {
            Node::Directory => Err(self.is_directory_error()),
            Node::NewObject | Node::Unknown => Err(self.not_found()),
            _ => {
                self.bucket
                    .backend()
                    .delete_object(self.path.absolute_name())
                    .await?;
                self.install(&node, Node::NewObject);
                Ok(())
            }
        }
    }

    /// Starts a background upload. The cached state is refreshed once the
    /// transfer ends, whatever the outcome.
    pub fn upload(&self, source: impl Into<PutSource>) -> Result<TransferHandle> {
        let origin = self.node.load_full();
        if matches!(*origin, Node::Directory) {
            return Err(self.is_directory_error());
        }
        let transfer = Arc::clone(self.bucket.backend())
            .begin_upload(self.path.absolute_name(), source.into());
        Ok(self.watch(origin, transfer))
    }

    /// Starts a background download into `destination`.
    pub async fn download(&self, destination: impl Into<PathBuf>) -> Result<TransferHandle> {
        let node = self.settled().await?;
        match &*node {
            Node::Directory => Err(self.is_directory_error()),
            Node::NewObject | Node::Unknown => Err(self.not_found()),
            _ => {
                let transfer = Arc::clone(self.bucket.backend())
                    .begin_download(self.path.absolute_name(), destination.into());
                Ok(self.watch(node, transfer))
            }
        }
    }

    /// Every object below this handle, without delimiter grouping.
    pub fn files(&self) -> BoxStream<'static, Result<Handle>> {
        let mut request = ListRequest::new();
        request.prefix = self.path.search_prefix();
        self.files_with(request)
    }

    /// Objects matching `request`. An unset prefix defaults to this
    /// handle's search prefix.
    pub fn files_with(&self, mut request: ListRequest) -> BoxStream<'static, Result<Handle>> {
        if !self.can_list() {
            return stream::empty().boxed();
        }
        if request.prefix.is_none() {
            request.prefix = self.path.search_prefix();
        }
        self.bucket.objects_with(request)
    }

    /// Every descendant, level by level.
    pub fn walk(&self) -> BoxStream<'static, Result<Handle>> {
        self.walk_bounded(0, UNBOUNDED)
    }

    /// Descendants at most `max_depth` levels down. `0` and `1` both list
    /// the direct children only.
    pub fn walk_depth(&self, max_depth: usize) -> BoxStream<'static, Result<Handle>> {
        self.walk_bounded(0, max_depth)
    }

    /// Like [`walk_depth`](Self::walk_depth), additionally hiding entries
    /// less than `min_depth` levels below this handle. Hidden directories
    /// are still descended into.
    pub fn walk_bounded(
        &self,
        min_depth: usize,
        max_depth: usize,
    ) -> BoxStream<'static, Result<Handle>> {
        if !self.can_list() {
            return stream::empty().boxed();
        }
        walk::walk(self.clone(), min_depth, max_depth)
    }

    fn can_list(&self) -> bool {
        matches!(**self.node.load(), Node::Directory | Node::Unknown)
    }

    /// Current node, resolved first if nothing is known yet.
    async fn settled(&self) -> Result<Arc<Node>> {
        let node = self.node.load_full();
        if matches!(*node, Node::Unknown) {
            return self.resolve(&node).await;
        }
        Ok(node)
    }

    async fn read_attr<T>(&self, pick: impl Fn(&Node) -> Option<T>) -> Result<T> {
        let mut node = self.node.load_full();
        loop {
            match &*node {
                Node::Directory => return Err(self.is_directory_error()),
                Node::NewObject => return Err(self.not_found()),
                other => {
                    if let Some(value) = pick(other) {
                        return Ok(value);
                    }
                }
            }
            node = self.resolve(&node).await?;
        }
    }

    async fn write_and_replace(&self, source: PutSource) -> Result<()> {
        let origin = self.node.load_full();
        if matches!(*origin, Node::Directory) {
            return Err(self.is_directory_error());
        }
        let ack = self
            .bucket
            .backend()
            .put_object(self.path.absolute_name(), source, None)
            .await?;
        self.install(&origin, Node::UpdatedObject(ack));
        Ok(())
    }

    /// Fetches the object and installs what was learned in place of
    /// `origin`. Absence becomes `NewObject`; any other store failure leaves
    /// the state untouched.
    pub(crate) fn current(&self) -> Arc<Node> {
        self.node.load_full()
    }

    pub(crate) async fn resolve(&self, origin: &Arc<Node>) -> Result<Arc<Node>> {
        let key = self.path.absolute_name();
        let next = match self.bucket.backend().fetch_object(key).await {
            Ok(object) => Node::Metadata {
                meta: object.meta,
                content: Some(object.content),
            },
            Err(e) if e.is_not_found() => Node::NewObject,
            Err(e) => return Err(e.into()),
        };
        Ok(self.install(origin, next))
    }

    /// Swaps `next` in if the cell still holds `origin`; otherwise keeps and
    /// returns whatever got there first.
    pub(crate) fn install(&self, origin: &Arc<Node>, next: Node) -> Arc<Node> {
        let next = Arc::new(next);
        let prev = self.node.compare_and_swap(origin, Arc::clone(&next));
        if Arc::ptr_eq(&*prev, origin) {
            debug!(
                bucket = self.bucket.name(),
                key = self.path.absolute_name(),
                from = %origin.kind(),
                to = %next.kind(),
                "handle state changed"
            );
            next
        } else {
            let winner = Guard::into_inner(prev);
            trace!(
                key = self.path.absolute_name(),
                kept = %winner.kind(),
                "lost state race"
            );
            winner
        }
    }

    fn watch(&self, origin: Arc<Node>, transfer: Transfer) -> TransferHandle {
        let key = transfer.key().to_string();
        let abort = transfer.abort_handle();
        let handle = self.clone();
        let watcher = tokio::spawn(async move {
            let state = transfer.wait().await;
            if let Err(e) = handle.resolve(&origin).await {
                warn!(
                    key = handle.absolute_name(),
                    error = %e,
                    "failed to refresh handle after transfer"
                );
            }
            state
        });
        TransferHandle {
            key,
            abort,
            watcher,
        }
    }

    fn not_found(&self) -> Error {
        Error::NotFound {
            bucket: self.bucket.name().to_string(),
            key: self.path.absolute_name().to_string(),
        }
    }

    fn is_directory_error(&self) -> Error {
        Error::IsDirectory {
            path: self.path.absolute_name().to_string(),
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("bucket", &self.bucket.name())
            .field("path", &self.path.absolute_name())
            .field("node", &self.state())
            .finish()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle{{bucket='{}', path='{}', node='{}'}}",
            self.bucket.name(),
            self.path,
            self.state()
        )
    }
}

/// A running upload or download started from a [`Handle`].
#[derive(Debug)]
pub struct TransferHandle {
    key: String,
    abort: AbortHandle,
    watcher: JoinHandle<TransferState>,
}

impl TransferHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancels the transfer. The handle is still refreshed afterwards.
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.watcher.is_finished()
    }

    /// Waits for the transfer and the refresh that follows it.
    pub async fn wait(self) -> Result<()> {
        match self.watcher.await {
            Ok(TransferState::Completed) => Ok(()),
            Ok(TransferState::Failed(e)) => Err(e.into()),
            Ok(TransferState::Canceled) => Err(Error::TransferCanceled { key: self.key }),
            Err(e) => Err(StoreError::backend(e).into()),
        }
    }
}
