use super::{Handle, Node};
use crate::cadapter::client::PutSource;
use crate::error::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

/// Buffered writer returned by [`Handle::set_value_as_stream`].
///
/// Nothing reaches the store until the writer is closed, either through
/// `AsyncWriteExt::shutdown` or [`finish`](ValueWriter::finish): the buffered
/// bytes are stored in one put, the metadata is fetched back and installed on
/// the handle. A writer dropped while still open commits the same way, on a
/// spawned task inside a tokio runtime and on a short-lived runtime outside
/// of one.
pub struct ValueWriter {
    handle: Handle,
    buf: Vec<u8>,
    committed: bool,
    closing: Option<BoxFuture<'static, Result<()>>>,
}

impl ValueWriter {
    pub(super) fn new(handle: Handle) -> Self {
        Self {
            handle,
            buf: Vec::new(),
            committed: false,
            closing: None,
        }
    }

    pub fn key(&self) -> &str {
        self.handle.absolute_name()
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Closes the writer and reports the outcome of the commit. Calling it
    /// after a completed shutdown is a no-op.
    pub async fn finish(mut self) -> Result<()> {
        if let Some(closing) = self.closing.take() {
            return closing.await;
        }
        match self.take_commit() {
            Some(commit) => commit.await,
            None => Ok(()),
        }
    }

    /// The commit future, handed out once.
    fn take_commit(&mut self) -> Option<BoxFuture<'static, Result<()>>> {
        if self.committed {
            return None;
        }
        self.committed = true;
        let data = Bytes::from(std::mem::take(&mut self.buf));
        let handle = self.handle.clone();
        Some(Box::pin(async move { commit(&handle, data).await }))
    }
}

/// Stores `data` and installs the re-fetched metadata. The origin is the
/// node current when the put starts, so reads made while the writer was
/// open do not make the install lose.
async fn commit(handle: &Handle, data: Bytes) -> Result<()> {
    let origin = handle.current();
    let backend = handle.bucket().backend();
    let key = handle.absolute_name();
    backend.put_object(key, PutSource::Bytes(data), None).await?;
    // a streamed put carries no usable metadata, ask the store instead
    let next = match backend.fetch_metadata(key).await {
        Ok(meta) => Node::Metadata {
            meta,
            content: None,
        },
        Err(e) if e.is_not_found() => Node::NewObject,
        Err(e) => return Err(e.into()),
    };
    handle.install(&origin, next);
    Ok(())
}

impl AsyncWrite for ValueWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "value writer is closed",
            )));
        }
        this.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closing.is_none() {
            match this.take_commit() {
                Some(commit) => this.closing = Some(commit),
                None => return Poll::Ready(Ok(())),
            }
        }
        let Some(closing) = this.closing.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let outcome = ready!(closing.as_mut().poll(cx));
        this.closing = None;
        Poll::Ready(outcome.map_err(io::Error::other))
    }
}

impl Drop for ValueWriter {
    fn drop(&mut self) {
        let Some(commit) = self.closing.take().or_else(|| self.take_commit()) else {
            return;
        };
        let key = self.handle.absolute_name().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                debug!(key = %key, "committing dropped value writer");
                rt.spawn(async move {
                    if let Err(e) = commit.await {
                        warn!(key = %key, error = %e, "failed to commit dropped value writer");
                    }
                });
            }
            Err(_) => {
                debug!(key = %key, "committing dropped value writer outside a runtime");
                let outcome = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(crate::error::Error::from)
                    .and_then(|rt| rt.block_on(commit));
                if let Err(e) = outcome {
                    warn!(key = %key, error = %e, "failed to commit dropped value writer");
                }
            }
        }
    }
}

impl fmt::Debug for ValueWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueWriter")
            .field("key", &self.key())
            .field("buffered", &self.buf.len())
            .field("committed", &self.committed)
            .finish()
    }
}
