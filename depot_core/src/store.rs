//! Server-side flat directory of published archives.
//!
//! There is no in-memory index: every list and lookup re-enumerates the
//! directory, so entries always reflect the filesystem's current state.
//! Concurrent same-name uploads race at the filesystem level (last
//! writer wins); the store takes no locks.

use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::constants::{FIELD_DELIMITER, RECV_CHUNK};
use crate::error::TransferError;
use crate::hash::Digest;

/// One archive held by the store, described by filesystem metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Base file name, unique within the store directory.
    pub name: String,
    /// Modification time, whole seconds since the epoch.
    pub modified_at: u64,
    /// File size in bytes.
    pub size: u64,
}

/// A name the store will accept: non-empty, a bare file name with no
/// path components, and free of the list-payload delimiter.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(FIELD_DELIMITER)
        && !name.contains('\\')
        && Path::new(name).file_name().is_some_and(|base| base == name)
}

/// Flat directory of published archives.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if absent.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate entries in filesystem enumeration order (no sort).
    /// Non-file entries and non-UTF-8 names are skipped; the latter
    /// could never be framed for the wire.
    pub async fn list(&self) -> std::io::Result<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let meta = dirent.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = match dirent.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let modified_at = meta
                .modified()?
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            entries.push(StoreEntry {
                name,
                modified_at,
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    /// First entry in enumeration order whose name contains `query` as a
    /// substring. First-match semantics, not best-match.
    pub async fn find(&self, query: &str) -> std::io::Result<Option<StoreEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|entry| entry.name.contains(query)))
    }

    /// Stream exactly `total_size` bytes from `reader` into a new file
    /// named `name`, deleting any existing file of that name first.
    /// Not atomic: a crash mid-write leaves no file, which the caller
    /// already treats as a failed upload.
    ///
    /// Bytes arrive in increments of at most `RECV_CHUNK` and are folded
    /// into a running SHA-256 as they land; the returned digest lets the
    /// upload handler verify without a second read pass. Each read must
    /// make progress within `idle`.
    pub async fn write<R>(
        &self,
        name: &str,
        total_size: u64,
        reader: &mut R,
        idle: Duration,
    ) -> Result<Digest, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.entry_path(name)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }
        let mut file = File::create(&path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; RECV_CHUNK];
        let mut received: u64 = 0;
        while received < total_size {
            let want = (total_size - received).min(RECV_CHUNK as u64) as usize;
            let n = timeout(idle, reader.read(&mut buffer[..want]))
                .await
                .map_err(|_| TransferError::Timeout)??;
            if n == 0 {
                return Err(TransferError::Protocol(format!(
                    "upload stream ended after {received} of {total_size} bytes"
                )));
            }
            file.write_all(&buffer[..n]).await?;
            hasher.update(&buffer[..n]);
            received += n as u64;
        }
        file.flush().await?;
        Ok(hasher.finalize().into())
    }

    /// Delete a stored file; used to discard a corrupt upload.
    pub async fn remove(&self, name: &str) -> Result<(), TransferError> {
        let path = self.entry_path(name)?;
        fs::remove_file(&path).await?;
        Ok(())
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, TransferError> {
        if !valid_name(name) {
            return Err(TransferError::Protocol(format!(
                "unacceptable store name {name:?}"
            )));
        }
        Ok(self.root.join(name))
    }
}
