#![allow(dead_code)]

use bucketfs::cadapter::localfs::LocalFsBackend;
use bucketfs::cadapter::memory::MemoryBackend;
use bucketfs::{Bucket, Handle};
use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;

pub const REPOSITORY: &[&str] = &[
    "org.color/red/1/1.4/foo.txt",
    "org.color.bright/green/1/1.4/foo.txt",
    "junit/junit/4/4.12/bar.txt",
    "io.tomitribe/crest/5/5.4.1.2/baz.txt",
];

pub fn memory_bucket(keys: &[&str]) -> (Bucket, Arc<MemoryBackend>) {
    memory_bucket_paged(keys, bucketfs::cadapter::memory::DEFAULT_PAGE_SIZE)
}

pub fn memory_bucket_paged(keys: &[&str], page_size: usize) -> (Bucket, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new().with_page_size(page_size));
    for key in keys {
        backend.insert(*key, format!("content of {key}"));
    }
    (Bucket::from_arc("repository", backend.clone()), backend)
}

/// Writes every key below `dir` and serves it as a bucket.
pub async fn local_bucket(dir: &std::path::Path, keys: &[&str]) -> Bucket {
    let bucket = Bucket::new("repository", LocalFsBackend::new(dir));
    for key in keys {
        bucket
            .root()
            .get_file(key)
            .unwrap()
            .set_value_as_string(format!("content of {key}"))
            .await
            .unwrap();
    }
    bucket
}

/// Absolute names, directories marked with a trailing slash.
pub async fn paths(stream: BoxStream<'static, bucketfs::Result<Handle>>) -> Vec<String> {
    let handles: Vec<Handle> = stream.try_collect().await.unwrap();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        if handle.is_directory().await.unwrap() {
            out.push(format!("{}/", handle.absolute_name()));
        } else {
            out.push(handle.absolute_name().to_string());
        }
    }
    out
}
