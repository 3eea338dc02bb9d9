//! One-shot client operations: publish, list, download.
//!
//! Each operation opens a fresh connection, performs exactly one
//! request/response exchange, and closes it. No operation retries.

use bytes::{BufMut, BytesMut};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::archive;
use crate::constants::{READ_TIMEOUT, RECV_CHUNK, TRANSFER_PORT};
use crate::error::TransferError;
use crate::hash::digest_file;
use crate::protocol::{self, Command, MAX_LIST_PAYLOAD};
use crate::store::StoreEntry;

/// Client for the transfer protocol.
#[derive(Debug, Clone)]
pub struct DepotClient {
    /// Server address, `host` or `host:port`.
    server: String,
    /// Where `publish` stages freshly packaged archives.
    staging_dir: PathBuf,
}

impl DepotClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            staging_dir: PathBuf::from("."),
        }
    }

    /// Stage packaged archives somewhere other than the working
    /// directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    async fn connect(&self) -> Result<TcpStream, TransferError> {
        let addr = if self.server.contains(':') {
            self.server.clone()
        } else {
            format!("{}:{}", self.server, TRANSFER_PORT)
        };
        Ok(TcpStream::connect(addr).await?)
    }

    /// Package `path` into an archive, then upload it. Returns the
    /// server's 2-byte status: 200 on success, 500 on a digest mismatch,
    /// anything else verbatim for the caller to report.
    pub async fn publish(&self, path: &Path) -> Result<u16, TransferError> {
        tracing::info!("Packaging {}", path.display());
        let src = path.to_path_buf();
        let staging = self.staging_dir.clone();
        let archive_path =
            tokio::task::spawn_blocking(move || archive::package_path(&src, &staging))
                .await
                .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;

        let name = archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::Protocol("archive name is not valid UTF-8".into()))?
            .to_string();
        if name.len() > u8::MAX as usize {
            return Err(TransferError::Protocol(format!(
                "file name {name:?} exceeds the 255-byte name field"
            )));
        }
        let size = fs::metadata(&archive_path).await?.len();

        tracing::info!("Computing SHA-256 of {name}");
        let digest = digest_file(&archive_path).await?;

        let mut header = BytesMut::new();
        protocol::put_uint(&mut header, Command::Upload.code() as u64, 2);
        protocol::put_uint(&mut header, name.len() as u64, 1);
        protocol::put_uint(&mut header, size, 8);
        header.put_slice(name.as_bytes());
        header.put_slice(&digest);

        tracing::info!(
            "Sending {name} ({size} bytes, sha256 {})",
            hex::encode(digest)
        );
        let mut stream = self.connect().await?;
        stream.write_all(&header).await?;
        let mut file = File::open(&archive_path).await?;
        tokio::io::copy(&mut file, &mut stream).await?;

        let status = timeout(READ_TIMEOUT, protocol::read_status(&mut stream))
            .await
            .map_err(|_| TransferError::Timeout)??;
        stream.shutdown().await?;
        Ok(status)
    }

    /// Fetch the store listing in arrival order. The listing ends on a
    /// zero-size frame (empty store) or on the server closing the
    /// connection; both reads are bounded so a stalled peer cannot hang
    /// the client.
    pub async fn list(&self) -> Result<Vec<StoreEntry>, TransferError> {
        let mut stream = self.connect().await?;
        stream
            .write_all(&Command::List.code().to_be_bytes())
            .await?;

        let mut items = Vec::new();
        loop {
            let size = match timeout(READ_TIMEOUT, protocol::read_uint(&mut stream, 10)).await {
                Err(_) => return Err(TransferError::Timeout),
                Ok(Err(TransferError::Io(e)))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Ok(other) => other?,
            };
            if size == 0 {
                break;
            }
            if size > MAX_LIST_PAYLOAD {
                return Err(TransferError::Protocol(format!(
                    "list payload size {size} is implausible"
                )));
            }
            let mut payload = vec![0u8; size as usize];
            timeout(READ_TIMEOUT, stream.read_exact(&mut payload))
                .await
                .map_err(|_| TransferError::Timeout)??;
            items.push(protocol::decode_entry(&payload)?);
        }
        Ok(items)
    }

    /// Download the first entry matching `query` into `dest_dir`. If the
    /// payload is an archive it is safely extracted there and the
    /// archive file deleted; otherwise the file is kept as-is.
    ///
    /// Returns `NotFound` both for an empty store (status 404) and for
    /// the server's no-match answer, which on the wire is a bare status
    /// 200 followed by a close; the metadata read is bounded so that
    /// case can never block indefinitely.
    pub async fn download(&self, query: &str, dest_dir: &Path) -> Result<PathBuf, TransferError> {
        if query.len() > u16::MAX as usize {
            return Err(TransferError::Protocol(
                "query exceeds the 2-byte length field".into(),
            ));
        }
        let mut header = BytesMut::new();
        protocol::put_uint(&mut header, Command::Download.code() as u64, 2);
        protocol::put_string(&mut header, query, 2);

        let mut stream = self.connect().await?;
        stream.write_all(&header).await?;

        let status = timeout(READ_TIMEOUT, protocol::read_status(&mut stream))
            .await
            .map_err(|_| TransferError::Timeout)??;
        if status > 399 {
            return Err(TransferError::NotFound);
        }

        let name_len = match timeout(READ_TIMEOUT, protocol::read_uint(&mut stream, 1)).await {
            Err(_) => return Err(TransferError::Timeout),
            Ok(Err(TransferError::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransferError::NotFound);
            }
            Ok(other) => other?,
        };
        if name_len == 0 {
            return Err(TransferError::NotFound);
        }

        let mut name_buf = vec![0u8; name_len as usize];
        timeout(READ_TIMEOUT, stream.read_exact(&mut name_buf))
            .await
            .map_err(|_| TransferError::Timeout)??;
        let name = String::from_utf8(name_buf)
            .map_err(|_| TransferError::Protocol("file name is not valid UTF-8".into()))?;
        let file_size = timeout(READ_TIMEOUT, protocol::read_uint(&mut stream, 8))
            .await
            .map_err(|_| TransferError::Timeout)??;

        // Trust only the base name; the server does not get to pick
        // where the file lands.
        let local_name = Path::new(&name)
            .file_name()
            .ok_or_else(|| TransferError::Protocol(format!("unusable file name {name:?}")))?;
        let target = dest_dir.join(local_name);
        tracing::info!(
            "Downloading {name} ({file_size} bytes) to {}",
            target.display()
        );

        if fs::try_exists(&target).await? {
            fs::remove_file(&target).await?;
        }
        let mut file = File::create(&target).await?;
        let mut buffer = [0u8; RECV_CHUNK];
        let mut received: u64 = 0;
        while received < file_size {
            let want = (file_size - received).min(RECV_CHUNK as u64) as usize;
            let n = timeout(READ_TIMEOUT, stream.read(&mut buffer[..want]))
                .await
                .map_err(|_| TransferError::Timeout)??;
            if n == 0 {
                return Err(TransferError::Protocol(format!(
                    "download ended after {received} of {file_size} bytes"
                )));
            }
            file.write_all(&buffer[..n]).await?;
            received += n as u64;
        }
        file.flush().await?;
        drop(file);

        if archive::is_archive(&target) {
            let archive_path = target.clone();
            let dest = dest_dir.to_path_buf();
            tokio::task::spawn_blocking(move || archive::extract_archive(&archive_path, &dest))
                .await
                .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;
            fs::remove_file(&target).await?;
            tracing::info!("Extracted {} into {}", name, dest_dir.display());
            return Ok(dest_dir.to_path_buf());
        }
        Ok(target)
    }
}
