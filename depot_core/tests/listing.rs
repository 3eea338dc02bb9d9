//! Listing wire behavior: the empty-store sentinel, and one frame per
//! entry with metadata matching the filesystem.

use depot_core::{DepotClient, FileStore, run_server};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server(store_dir: &std::path::Path) -> SocketAddr {
    let store = FileStore::open(store_dir).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_server(listener, store));
    addr
}

#[tokio::test]
async fn empty_store_sends_the_zero_size_sentinel() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&205u16.to_be_bytes()).await.unwrap();

    let mut sentinel = [0u8; 10];
    stream.read_exact(&mut sentinel).await.unwrap();
    assert_eq!(sentinel, [0u8; 10]);

    // Nothing follows the sentinel.
    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn client_list_reports_no_items_for_empty_store() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let client = DepotClient::new(addr.to_string());
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_returns_every_entry_with_metadata() {
    let store_dir = tempfile::tempdir().unwrap();
    std::fs::write(store_dir.path().join("alpha.tar.gz"), b"aaa").unwrap();
    std::fs::write(store_dir.path().join("beta.tar.gz"), b"bbbbbbb").unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let client = DepotClient::new(addr.to_string());
    let items = client.list().await.unwrap();
    assert_eq!(items.len(), 2);

    for item in &items {
        let meta = std::fs::metadata(store_dir.path().join(&item.name)).unwrap();
        assert_eq!(item.size, meta.len());
        let mtime = meta
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(item.modified_at, mtime);
    }

    let mut names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["alpha.tar.gz", "beta.tar.gz"]);
}
