//! Unrecognized commands get status 400 and the connection is closed;
//! the accept loop keeps serving afterwards.

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

#[tokio::test]
async fn unknown_command_is_rejected_with_400() {
    let store_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(store_dir.path()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&999u16.to_be_bytes()).await.unwrap();

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await.unwrap();
    assert_eq!(u16::from_be_bytes(status), 400);
    let mut rest = [0u8; 1];
    assert_eq!(stream.read(&mut rest).await.unwrap(), 0);

    // The rejection was isolated to that connection; a list still works.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&205u16.to_be_bytes()).await.unwrap();
    let mut sentinel = [0u8; 10];
    stream.read_exact(&mut sentinel).await.unwrap();
    assert_eq!(sentinel, [0u8; 10]);
}
