//! Depth-bounded traversal of the pseudo-directory tree.
//!
//! Every directory is listed one level at a time with the `/` delimiter.
//! A level's objects and common prefixes are yielded as soon as their page
//! arrives, then the sub-directories found on that level are walked one
//! after the other, each to completion. Listing order is preserved and
//! pagination is invisible to the consumer.

use crate::bucket::Bucket;
use crate::cadapter::client::ListRequest;
use crate::error::Result;
use crate::handle::{Handle, Node, NodeKind};
use crate::listing::Pager;
use crate::path::Path;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Depth bound meaning "no limit".
pub const UNBOUNDED: usize = usize::MAX;

const DELIMITER: &str = "/";

/// One directory being listed.
struct Frame {
    pager: Pager,
    /// Entries of the fetched pages not yet handed out.
    ready: VecDeque<Handle>,
    /// Sub-directories to walk once this level is exhausted.
    pending: VecDeque<Handle>,
    /// Depth bound as seen from this directory.
    depth: usize,
    /// Distance of this frame's entries from the starting directory.
    level: usize,
}

impl Frame {
    /// Whether entries of this frame may be descended into.
    fn descends(&self) -> bool {
        self.depth == UNBOUNDED || self.depth > 1
    }

    fn child_depth(&self) -> usize {
        if self.depth == UNBOUNDED {
            UNBOUNDED
        } else {
            self.depth - 1
        }
    }
}

struct Walk {
    bucket: Bucket,
    stack: Vec<Frame>,
    min_depth: usize,
}

impl Walk {
    fn new(start: &Handle, min_depth: usize, max_depth: usize) -> Self {
        let bucket = start.bucket().clone();
        let root = frame(&bucket, start.path(), max_depth, 1);
        Self {
            bucket,
            stack: vec![root],
            min_depth,
        }
    }

    async fn next(&mut self) -> Result<Option<Handle>> {
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };

            if let Some(entry) = top.ready.pop_front() {
                if top.descends() && entry.state() == NodeKind::Directory {
                    top.pending.push_back(entry.clone());
                }
                if top.level >= self.min_depth {
                    return Ok(Some(entry));
                }
                continue;
            }

            if let Some(page) = top.pager.next_page().await? {
                let prefix = top.pager.prefix().map(str::to_string);
                for summary in page.objects {
                    // a "dir/" marker object stands for the directory itself
                    if Some(summary.key.as_str()) == prefix.as_deref() {
                        continue;
                    }
                    top.ready.push_back(Handle::from_summary(&self.bucket, summary));
                }
                for common in page.common_prefixes {
                    let path = Path::from_key(&common);
                    top.ready
                        .push_back(Handle::with_node(self.bucket.clone(), path, Node::Directory));
                }
                continue;
            }

            if let Some(dir) = top.pending.pop_front() {
                let depth = top.child_depth();
                let level = top.level + 1;
                debug!(
                    bucket = self.bucket.name(),
                    prefix = dir.absolute_name(),
                    level,
                    "descending"
                );
                let child = frame(&self.bucket, dir.path(), depth, level);
                self.stack.push(child);
                continue;
            }

            self.stack.pop();
        }
    }
}

fn frame(bucket: &Bucket, dir: &Path, depth: usize, level: usize) -> Frame {
    let request = ListRequest {
        prefix: dir.search_prefix(),
        delimiter: Some(DELIMITER.to_string()),
        ..ListRequest::default()
    };
    Frame {
        pager: Pager::new(Arc::clone(bucket.backend()), request),
        ready: VecDeque::new(),
        pending: VecDeque::new(),
        depth,
        level,
    }
}

/// Walks the tree below `start`.
///
/// `max_depth` counts levels: `1` lists the direct children only, `2` their
/// children as well, [`UNBOUNDED`] everything; `0` behaves like `1`.
/// Entries fewer than `min_depth` levels below `start` are not yielded, but
/// directories among them are still descended into.
pub(crate) fn walk(
    start: Handle,
    min_depth: usize,
    max_depth: usize,
) -> BoxStream<'static, Result<Handle>> {
    let walk = Walk::new(&start, min_depth, max_depth);
    stream::try_unfold(walk, |mut walk| async move {
        let next = walk.next().await;
        next.map(|found| found.map(|handle| (handle, walk)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::memory::MemoryBackend;
    use futures::TryStreamExt;

    fn bucket(keys: &[&str], page_size: usize) -> (Bucket, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new().with_page_size(page_size));
        for key in keys {
            backend.insert(*key, key.to_string());
        }
        (Bucket::from_arc("repository", backend.clone()), backend)
    }

    async fn names(stream: BoxStream<'static, Result<Handle>>) -> Vec<String> {
        let handles: Vec<Handle> = stream.try_collect().await.unwrap();
        handles
            .iter()
            .map(|h| h.absolute_name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_max_depth_limits_levels() {
        let (bucket, _) = bucket(&["a/b/c.txt"], 1000);
        let root = bucket.root();
        assert_eq!(names(root.walk_depth(1)).await, vec!["a"]);
        assert_eq!(names(root.walk_depth(0)).await, vec!["a"]);
        assert_eq!(names(root.walk_depth(2)).await, vec!["a", "a/b"]);
        assert_eq!(names(root.walk()).await, vec!["a", "a/b", "a/b/c.txt"]);
    }

    #[tokio::test]
    async fn test_min_depth_hides_but_descends() {
        let (bucket, backend) = bucket(&["a/b/c.txt"], 1000);
        let walked = names(bucket.root().walk_bounded(2, UNBOUNDED)).await;
        assert_eq!(walked, vec!["a/b", "a/b/c.txt"]);
        // hidden levels are still listed
        assert_eq!(backend.stats().list, 3);
    }

    #[tokio::test]
    async fn test_level_precedes_nested_levels() {
        let (bucket, _) = bucket(&["x/1", "x/sub/2", "y", "z/3"], 1000);
        let walked = names(bucket.root().walk()).await;
        assert_eq!(walked, vec!["y", "x", "z", "x/1", "x/sub", "x/sub/2", "z/3"]);
    }

    #[tokio::test]
    async fn test_pagination_is_transparent() {
        let keys = ["d/a", "d/b", "d/c", "d/e/f", "d/g", "d/h/i"];
        let (paged, backend) = bucket(&keys, 2);
        let start = paged.root().get_file("d/").unwrap();
        // each page yields its objects before its common prefixes
        assert_eq!(
            names(start.walk()).await,
            vec!["d/a", "d/b", "d/c", "d/e", "d/g", "d/h", "d/e/f", "d/h/i"]
        );
        assert_eq!(backend.stats().list, 5);

        let (whole, _) = bucket(&keys, 1000);
        let mut unpaged = names(whole.root().get_file("d/").unwrap().walk()).await;
        let mut repaged = names(start.walk()).await;
        unpaged.sort();
        repaged.sort();
        assert_eq!(unpaged, repaged);
    }

    #[tokio::test]
    async fn test_entry_states() {
        let (bucket, _) = bucket(&["colors/red.txt", "colors/warm/orange.txt"], 1000);
        let colors = bucket.root().get_file("colors").unwrap();
        let handles: Vec<Handle> = colors.walk_depth(1).try_collect().await.unwrap();
        let states: Vec<(String, NodeKind)> = handles
            .iter()
            .map(|h| (h.absolute_name().to_string(), h.state()))
            .collect();
        assert_eq!(
            states,
            vec![
                ("colors/red.txt".to_string(), NodeKind::ListingSummary),
                ("colors/warm".to_string(), NodeKind::Directory),
            ]
        );
    }

    #[tokio::test]
    async fn test_marker_object_is_skipped() {
        let (bucket, _) = bucket(&["docs/", "docs/readme"], 1000);
        let docs = bucket.root().get_file("docs/").unwrap();
        assert_eq!(names(docs.walk()).await, vec!["docs/readme"]);
    }

    #[tokio::test]
    async fn test_empty_walks() {
        let (bucket, backend) = bucket(&[], 1000);
        assert!(names(bucket.root().walk()).await.is_empty());
        let absent = bucket.root().get_file("nothing").unwrap();
        assert!(!absent.exists().await.unwrap());
        let before = backend.stats().list;
        assert!(names(absent.walk()).await.is_empty());
        assert_eq!(backend.stats().list, before);
    }
}
