//! Accept loop and per-connection protocol handlers.
//!
//! One task per accepted connection. The protocol is strictly
//! one-request-per-connection: the 2-byte command is read once, exactly
//! one handler runs, and the connection is torn down. Per-connection
//! failures are logged and never stop the accept loop.

use bytes::{BufMut, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::constants::READ_TIMEOUT;
use crate::error::TransferError;
use crate::protocol::{
    self, Command, STATUS_BAD_REQUEST, STATUS_CORRUPT_UPLOAD, STATUS_NOT_FOUND, STATUS_OK,
};
use crate::store::{self, FileStore};

/// Accept connections forever, handling each in its own task.
pub async fn run_server(listener: TcpListener, store: FileStore) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Now listening on {addr}");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, store).await {
                        tracing::warn!("Connection from {peer} failed: {e}");
                    }
                });
            }
            Err(e) => {
                tracing::error!("Accept failed: {e}");
            }
        }
    }
}

/// Read the command selector and run exactly one handler, then shut the
/// connection down.
async fn handle_connection(mut stream: TcpStream, store: FileStore) -> Result<(), TransferError> {
    let code = read_timed_uint(&mut stream, 2).await? as u16;
    let result = match Command::from_code(code) {
        Command::Upload => handle_upload(&mut stream, &store).await,
        Command::List => handle_list(&mut stream, &store).await,
        Command::Download => handle_download(&mut stream, &store).await,
        Command::Invalid => {
            protocol::send_status(&mut stream, STATUS_BAD_REQUEST).await?;
            Err(TransferError::InvalidCommand(code))
        }
    };
    let _ = stream.shutdown().await;
    result
}

/// UPLOADING: header, digest, then a counted payload streamed into the
/// store while the digest is folded on arrival. Mismatch discards the
/// file and answers 500.
async fn handle_upload(stream: &mut TcpStream, store: &FileStore) -> Result<(), TransferError> {
    let name_len = read_timed_uint(stream, 1).await?;
    let file_size = read_timed_uint(stream, 8).await?;
    let mut name_buf = vec![0u8; name_len as usize];
    read_timed_exact(stream, &mut name_buf).await?;
    let mut expected = [0u8; 32];
    read_timed_exact(stream, &mut expected).await?;

    let name = match String::from_utf8(name_buf).ok().filter(|n| store::valid_name(n)) {
        Some(name) => name,
        None => {
            // Names with path components or the list delimiter would
            // poison the store; refuse before reading any payload byte.
            tracing::warn!("Rejected upload with unacceptable file name");
            protocol::send_status(stream, STATUS_BAD_REQUEST).await?;
            return Ok(());
        }
    };
    tracing::info!("Receiving {name} ({file_size} bytes)");

    let actual = match store.write(&name, file_size, stream, READ_TIMEOUT).await {
        Ok(digest) => digest,
        Err(e) => {
            // A truncated upload leaves a partial file behind.
            let _ = store.remove(&name).await;
            return Err(e);
        }
    };

    if actual == expected {
        tracing::info!("Stored {name}");
        protocol::send_status(stream, STATUS_OK).await?;
        Ok(())
    } else {
        tracing::warn!("Removing possibly corrupt file {name}");
        store.remove(&name).await?;
        protocol::send_status(stream, STATUS_CORRUPT_UPLOAD).await?;
        Err(TransferError::IntegrityMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        })
    }
}

/// LISTING: one size-prefixed payload per entry. An empty store answers
/// a single zero-size frame; a non-empty listing ends with the
/// connection close, not a terminator frame.
async fn handle_list(stream: &mut TcpStream, store: &FileStore) -> Result<(), TransferError> {
    let entries = store.list().await?;
    if entries.is_empty() {
        protocol::write_uint(stream, 0, 10).await?;
        return Ok(());
    }
    for entry in &entries {
        let payload = protocol::encode_entry(entry);
        let mut frame = BytesMut::with_capacity(10 + payload.len());
        protocol::put_uint(&mut frame, payload.len() as u64, 10);
        frame.put_slice(&payload);
        stream.write_all(&frame).await?;
        tracing::debug!("Sent listing frame for {}", entry.name);
    }
    Ok(())
}

/// DOWNLOADING: status, then metadata and the file bytes for the first
/// matching entry. A non-empty store with no match sends the bare 200
/// and closes; that close is the client's no-match signal.
async fn handle_download(stream: &mut TcpStream, store: &FileStore) -> Result<(), TransferError> {
    let query = timeout(READ_TIMEOUT, protocol::read_string(stream, 2))
        .await
        .map_err(|_| TransferError::Timeout)??;

    if store.list().await?.is_empty() {
        protocol::send_status(stream, STATUS_NOT_FOUND).await?;
        return Ok(());
    }
    protocol::send_status(stream, STATUS_OK).await?;

    let Some(entry) = store.find(&query).await? else {
        tracing::info!("No entry matching {query:?}");
        return Ok(());
    };
    tracing::info!("Serving {} ({} bytes) for query {query:?}", entry.name, entry.size);

    let mut header = BytesMut::new();
    protocol::put_uint(&mut header, entry.name.len() as u64, 1);
    header.put_slice(entry.name.as_bytes());
    protocol::put_uint(&mut header, entry.size, 8);
    stream.write_all(&header).await?;

    let mut file = File::open(store.root().join(&entry.name)).await?;
    tokio::io::copy(&mut file, stream).await?;
    Ok(())
}

async fn read_timed_uint(stream: &mut TcpStream, width: usize) -> Result<u64, TransferError> {
    timeout(READ_TIMEOUT, protocol::read_uint(stream, width))
        .await
        .map_err(|_| TransferError::Timeout)?
}

async fn read_timed_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), TransferError> {
    timeout(READ_TIMEOUT, stream.read_exact(buf))
        .await
        .map_err(|_| TransferError::Timeout)??;
    Ok(())
}
