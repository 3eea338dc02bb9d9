use sha2::{Digest as _, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::constants::BUFFER_SIZE;

/// Raw 32-byte SHA-256 digest, exactly as carried on the wire.
/// Two files hold identical content iff their digests are bitwise equal.
pub type Digest = [u8; 32];

/// Compute the SHA-256 digest of a file.
///
/// Reads sequentially in fixed-size chunks; the file is never held in
/// memory whole. The chunk size is an implementation constant, not
/// protocol-visible.
pub async fn digest_file(path: &Path) -> std::io::Result<Digest> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}
