use bucketfs::cadapter::memory::MemoryBackend;
use bucketfs::{Bucket, NodeKind};
use std::sync::Arc;
use std::time::Duration;

fn slow_bucket(keys: &[&str]) -> (Bucket, Arc<MemoryBackend>) {
    latent_bucket(Duration::from_millis(20), keys)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_settles_once() {
    let (bucket, backend) = slow_bucket(&["colors/red.txt"]);
    let red = bucket.root().get_file("colors/red.txt").unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let red = red.clone();
            tokio::spawn(async move {
                let etag = red.get_etag().await.unwrap();
                let value = red.get_value_as_string().await.unwrap();
                (etag, value)
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].1, "colors/red.txt");
    assert_eq!(red.state(), NodeKind::Metadata);

    // every racer may have fetched, afterwards nobody does
    let fetched = backend.stats().fetch_object;
    assert!((1..=8).contains(&fetched), "{fetched}");
    red.get_value().await.unwrap();
    assert_eq!(backend.stats().fetch_object, fetched);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_absence_settles_to_new_object() {
    let (bucket, _) = slow_bucket(&[]);
    let missing = bucket.root().get_file("colors/none.txt").unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let missing = missing.clone();
            tokio::spawn(async move { missing.exists().await.unwrap() })
        })
        .collect();
    for task in tasks {
        assert!(!task.await.unwrap());
    }
    assert_eq!(missing.state(), NodeKind::NewObject);
}

fn latent_bucket(latency: Duration, keys: &[&str]) -> (Bucket, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new().with_latency(latency));
    for key in keys {
        backend.insert(*key, key.to_string());
    }
    (Bucket::from_arc("repository", backend.clone()), backend)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resolution_started_first_keeps_its_result() {
    let (bucket, _) = latent_bucket(Duration::from_millis(100), &["colors/red.txt"]);
    let red = bucket.root().get_file("colors/red.txt").unwrap();

    // reads the old value at ~100ms and installs it
    let reader = {
        let red = red.clone();
        tokio::spawn(async move { red.exists().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    // captures Unknown as origin, its put lands at ~130ms
    red.set_value_as_string("crimson").await.unwrap();
    assert!(reader.await.unwrap());

    // the write's swap lost against the resolution that finished first
    assert_eq!(red.state(), NodeKind::Metadata);
    assert_eq!(red.get_value_as_string().await.unwrap(), "colors/red.txt");
    assert_eq!(
        bucket.get_object_as_string("colors/red.txt").await.unwrap(),
        "crimson"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_landing_first_wins_over_late_resolution() {
    let (bucket, backend) = latent_bucket(Duration::from_millis(100), &["colors/red.txt"]);
    let red = bucket.root().get_file("colors/red.txt").unwrap();

    // installs UpdatedObject at ~100ms
    let writer = {
        let red = red.clone();
        tokio::spawn(async move { red.set_value_as_string("crimson").await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    // resolves from Unknown, finishes at ~130ms and adopts the write
    assert!(red.exists().await.unwrap());
    writer.await.unwrap();

    assert_eq!(red.state(), NodeKind::UpdatedObject);
    assert_eq!(red.get_value_as_string().await.unwrap(), "crimson");
    assert!(backend.contains("colors/red.txt"));
}
