//! Page-by-page listings stitched into flat streams.

use crate::bucket::Bucket;
use crate::cadapter::client::{ListPage, ListRequest, ObjectBackend, ObjectSummary};
use crate::error::Result;
use crate::handle::Handle;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Follows continuation tokens until the listing is exhausted.
pub(crate) struct Pager {
    backend: Arc<dyn ObjectBackend>,
    request: ListRequest,
    done: bool,
}

impl Pager {
    pub(crate) fn new(backend: Arc<dyn ObjectBackend>, request: ListRequest) -> Self {
        Self {
            backend,
            request,
            done: false,
        }
    }

    pub(crate) fn prefix(&self) -> Option<&str> {
        self.request.prefix.as_deref()
    }

    /// The next page, `None` once the previous one was the last.
    pub(crate) async fn next_page(&mut self) -> Result<Option<ListPage>> {
        if self.done {
            return Ok(None);
        }
        let page = self.backend.list(&self.request).await?;
        trace!(
            prefix = self.prefix().unwrap_or(""),
            objects = page.objects.len(),
            common_prefixes = page.common_prefixes.len(),
            truncated = page.is_truncated,
            "fetched listing page"
        );
        match (page.is_truncated, &page.next_continuation_token) {
            (true, Some(token)) => self.request.continuation_token = Some(token.clone()),
            // no token: resume after the last entry seen, as v1 markers do
            (true, None) => match resume_after(&page) {
                Some(key) => self.request.start_after = Some(key),
                None => self.done = true,
            },
            (false, _) => self.done = true,
        }
        Ok(Some(page))
    }
}

/// Marker past the last entry of `page`. A common prefix is padded with the
/// greatest char so every key grouped under it is skipped as well.
fn resume_after(page: &ListPage) -> Option<String> {
    let object = page.objects.last().map(|o| o.key.clone());
    let prefix = page
        .common_prefixes
        .last()
        .map(|cp| format!("{cp}{}", char::MAX));
    object.max(prefix)
}

/// Objects of every page as `ListingSummary` handles. Common prefixes are
/// not surfaced.
pub(crate) fn objects(bucket: Bucket, request: ListRequest) -> BoxStream<'static, Result<Handle>> {
    let pager = Pager::new(Arc::clone(bucket.backend()), request);
    let listing = Objects {
        bucket,
        pager,
        ready: VecDeque::new(),
    };
    stream::try_unfold(listing, |mut listing| async move {
        let next = listing.next().await;
        next.map(|found| found.map(|handle| (handle, listing)))
    })
    .boxed()
}

struct Objects {
    bucket: Bucket,
    pager: Pager,
    ready: VecDeque<ObjectSummary>,
}

impl Objects {
    async fn next(&mut self) -> Result<Option<Handle>> {
        loop {
            if let Some(summary) = self.ready.pop_front() {
                return Ok(Some(Handle::from_summary(&self.bucket, summary)));
            }
            match self.pager.next_page().await? {
                Some(page) => self.ready.extend(page.objects),
                None => return Ok(None),
            }
        }
    }
}
