mod common;

use bucketfs::{Error, Handle, NodeKind};
use common::{local_bucket, memory_bucket};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn one_handle_across_create_overwrite_delete() {
    let (bucket, backend) = memory_bucket(&[]);
    let red = bucket.root().get_file("colors/red.txt").unwrap();

    // before it exists
    assert!(!red.exists().await.unwrap());
    assert_eq!(red.state(), NodeKind::NewObject);
    assert!(red.get_value_as_string().await.unwrap_err().is_not_found());

    // created
    red.set_value_as_string("crimson").await.unwrap();
    assert_eq!(red.state(), NodeKind::UpdatedObject);
    assert!(red.exists().await.unwrap());
    assert_eq!(red.get_value_as_string().await.unwrap(), "crimson");

    // overwritten through a stream
    let mut writer = red.set_value_as_stream().unwrap();
    writer.write_all(b"scarlet").await.unwrap();
    writer.finish().await.unwrap();
    assert_eq!(red.state(), NodeKind::Metadata);
    assert_eq!(red.get_size().await.unwrap(), 7);
    assert_eq!(red.get_value_as_string().await.unwrap(), "scarlet");

    // deleted
    red.delete().await.unwrap();
    assert_eq!(red.state(), NodeKind::NewObject);
    assert!(!backend.contains("colors/red.txt"));
    match red.get_value().await.unwrap_err() {
        Error::NotFound { bucket, key } => {
            assert_eq!(bucket, "repository");
            assert_eq!(key, "colors/red.txt");
        }
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn resolved_handle_stops_fetching() {
    let (bucket, backend) = memory_bucket(&["colors/red.txt"]);
    let red = bucket.root().get_file("colors/red.txt").unwrap();
    red.get_etag().await.unwrap();
    red.get_size().await.unwrap();
    red.get_last_modified().await.unwrap();
    red.get_value().await.unwrap();
    assert!(red.is_file().await.unwrap());
    assert_eq!(backend.stats().fetch_object, 1);
}

#[tokio::test]
async fn listing_children_are_objects() {
    let (bucket, backend) = memory_bucket(&["colors/red.txt", "colors/green.txt", "shapes/x"]);
    let colors = bucket.root().get_file("colors/").unwrap();
    let children: Vec<Handle> = colors.files().try_collect().await.unwrap();
    let names: Vec<&str> = children.iter().map(|h| h.absolute_name()).collect();
    assert_eq!(names, vec!["colors/green.txt", "colors/red.txt"]);
    for child in &children {
        assert_eq!(child.state(), NodeKind::ListingSummary);
        assert!(!child.is_directory().await.unwrap());
        assert!(child.get_file("x").unwrap_err().is_wrong_kind());
    }
    // metadata came with the listing
    let fetched = bucket.file("colors/red.txt").await.unwrap();
    assert_eq!(
        children[1].get_etag().await.unwrap(),
        fetched.get_etag().await.unwrap()
    );
    assert_eq!(children[1].get_size().await.unwrap(), fetched.get_size().await.unwrap());
    assert_eq!(backend.stats().fetch_object, 0);
}

#[tokio::test]
async fn files_with_defaults_prefix() {
    use bucketfs::cadapter::client::ListRequest;

    let (bucket, _) = memory_bucket(&["colors/a", "colors/b", "colors/c", "other/a"]);
    let colors = bucket.root().get_file("colors").unwrap();
    let after_a: Vec<Handle> = colors
        .files_with(ListRequest::new().with_start_after("colors/a"))
        .try_collect()
        .await
        .unwrap();
    let names: Vec<&str> = after_a.iter().map(|h| h.name()).collect();
    assert_eq!(names, vec!["b", "c"]);

    let explicit: Vec<Handle> = colors
        .files_with(ListRequest::new().with_prefix("other/"))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(explicit.len(), 1);
    assert_eq!(explicit[0].absolute_name(), "other/a");
}

#[tokio::test]
async fn parent_navigation_stops_at_root() {
    let (bucket, _) = memory_bucket(&[]);
    let leaf = bucket.root().get_file("a/b/c.txt").unwrap();
    let mut chain = Vec::new();
    let mut cur = leaf.get_parent();
    while let Some(parent) = cur {
        assert_eq!(parent.state(), NodeKind::Directory);
        chain.push(parent.absolute_name().to_string());
        cur = parent.get_parent();
    }
    assert_eq!(chain, vec!["a/b", "a", ""]);
}

#[tokio::test]
async fn unknown_and_absent_handles_still_derive_children() {
    let (bucket, _) = memory_bucket(&[]);
    let unknown = bucket.root().get_file("colors").unwrap();
    let child = unknown.get_file("red.txt").unwrap();
    assert_eq!(child.state(), NodeKind::Unknown);

    assert!(!unknown.exists().await.unwrap());
    let child = unknown.get_file("green.txt").unwrap();
    assert_eq!(child.absolute_name(), "colors/green.txt");
}

#[tokio::test]
async fn local_backend_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let bucket = local_bucket(tmp.path(), &["colors/red.txt"]).await;
    let red = bucket.file("colors/red.txt").await.unwrap();
    assert_eq!(
        red.get_value_as_string().await.unwrap(),
        "content of colors/red.txt"
    );
    red.delete().await.unwrap();
    assert!(!tmp.path().join("colors").exists());
    assert!(bucket.file("colors/red.txt").await.unwrap_err().is_not_found());
}
