//! Wire-level upload tests: a digest mismatch must leave no trace, and
//! unacceptable names are refused before any payload is read.

use depot_core::{FileStore, run_server};
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

fn upload_frame(name: &[u8], file_size: u64, digest: &[u8; 32], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&200u16.to_be_bytes());
    frame.push(name.len() as u8);
    frame.extend_from_slice(&file_size.to_be_bytes());
    frame.extend_from_slice(name);
    frame.extend_from_slice(digest);
    frame.extend_from_slice(payload);
    frame
}

async fn read_status(stream: &mut TcpStream) -> u16 {
    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await.unwrap();
    u16::from_be_bytes(status)
}

#[tokio::test]
async fn corrupt_upload_answers_500_and_leaves_no_file() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let payload = b"not what the digest says";
    let frame = upload_frame(b"corrupt.tar.gz", payload.len() as u64, &[0u8; 32], payload);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&frame).await.unwrap();

    assert_eq!(read_status(&mut stream).await, 500);
    assert!(!store_dir.path().join("corrupt.tar.gz").exists());
}

#[tokio::test]
async fn verified_upload_answers_200_and_stores_the_bytes() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let payload = b"all the right bytes".to_vec();
    let scratch = tempfile::tempdir().unwrap();
    let payload_file = scratch.path().join("payload");
    tokio::fs::write(&payload_file, &payload).await.unwrap();
    let digest = depot_core::digest_file(&payload_file).await.unwrap();

    let frame = upload_frame(b"good.tar.gz", payload.len() as u64, &digest, &payload);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&frame).await.unwrap();

    assert_eq!(read_status(&mut stream).await, 200);
    assert_eq!(
        std::fs::read(store_dir.path().join("good.tar.gz")).unwrap(),
        payload
    );
}

#[tokio::test]
async fn unacceptable_upload_names_are_rejected_with_400() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    for name in [
        &b"../escape.tar.gz"[..],
        &b"a<::>b.tar.gz"[..],
        &b"dir/pkg.tar.gz"[..],
    ] {
        // Header and digest only; the server must answer before any
        // payload byte is sent.
        let frame = upload_frame(name, 4, &[0u8; 32], b"");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&frame).await.unwrap();
        assert_eq!(read_status(&mut stream).await, 400);
    }
    assert_eq!(std::fs::read_dir(store_dir.path()).unwrap().count(), 0);
}
