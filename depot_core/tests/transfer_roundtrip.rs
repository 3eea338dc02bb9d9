//! End-to-end publish/list/download flow over real sockets.

use depot_core::{DepotClient, FileStore, digest_file, run_server};
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn spawn_server(store_dir: &std::path::Path) -> SocketAddr {
    let store = FileStore::open(store_dir).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_server(listener, store));
    addr
}

#[tokio::test]
async fn publish_list_download_roundtrip() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init()
        .ok();

    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("notes.txt");
    tokio::fs::write(&src, b"remember the milk").await.unwrap();

    let staging = tempfile::tempdir().unwrap();
    let client = DepotClient::new(addr.to_string()).with_staging_dir(staging.path());

    // Publish: the store gains the archive, byte-identical to the
    // staged one.
    let status = client.publish(&src).await.unwrap();
    assert_eq!(status, 200);
    let stored = store_dir.path().join("notes.txt.tar.gz");
    assert!(stored.exists());
    let staged = staging.path().join("notes.txt.tar.gz");
    assert_eq!(
        digest_file(&stored).await.unwrap(),
        digest_file(&staged).await.unwrap()
    );

    // List: exactly one entry whose metadata matches the filesystem.
    let items = client.list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "notes.txt.tar.gz");
    let meta = std::fs::metadata(&stored).unwrap();
    assert_eq!(items[0].size, meta.len());
    assert!(items[0].modified_at > 0);

    // Download by substring: the archive is extracted into the
    // destination and the archive file itself deleted.
    let dest = tempfile::tempdir().unwrap();
    let out = client.download("notes", dest.path()).await.unwrap();
    assert_eq!(out.as_path(), dest.path());
    assert_eq!(
        std::fs::read(dest.path().join("notes.txt")).unwrap(),
        b"remember the milk"
    );
    assert!(!dest.path().join("notes.txt.tar.gz").exists());
}

#[tokio::test]
async fn republish_overwrites_the_entry() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let work = tempfile::tempdir().unwrap();
    let src = work.path().join("config.json");
    let staging = tempfile::tempdir().unwrap();
    let client = DepotClient::new(addr.to_string()).with_staging_dir(staging.path());

    tokio::fs::write(&src, b"v1").await.unwrap();
    assert_eq!(client.publish(&src).await.unwrap(), 200);
    tokio::fs::write(&src, b"v2, now with much more content")
        .await
        .unwrap();
    assert_eq!(client.publish(&src).await.unwrap(), 200);

    let items = client.list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "config.json.tar.gz");
    let meta = std::fs::metadata(staging.path().join("config.json.tar.gz")).unwrap();
    assert_eq!(items[0].size, meta.len());
}
