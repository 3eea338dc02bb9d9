//! Wire protocol primitives.
//!
//! Every message is built from three field shapes:
//! - fixed-width unsigned big-endian integers (widths 1, 2, 8 and 10 bytes)
//! - length-prefixed byte strings (prefix width depends on the field's role)
//! - list payloads of the form `name<::>mtime(8)<::>size(8)`
//!
//! The codec is hand-rolled because the byte layout is fixed by the wire
//! format; malformed input decodes to `Command::Invalid` or a
//! `TransferError::Protocol`, never a panic.

use crate::constants::FIELD_DELIMITER;
use crate::error::TransferError;
use crate::store::StoreEntry;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Status sent after a verified upload, and ahead of download metadata
pub const STATUS_OK: u16 = 200;
/// Status sent for an unrecognized command or a rejected upload name
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status sent when downloading from an empty store
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status sent when an upload fails digest verification
pub const STATUS_CORRUPT_UPLOAD: u16 = 500;

/// Upper bound on a single list payload. A payload is one file name plus
/// two delimiters and two 8-byte integers, so anything near this size is
/// a corrupt or hostile length field.
pub const MAX_LIST_PAYLOAD: u64 = 4096;

/// Connection commands, transmitted as a 2-byte big-endian selector.
/// Read exactly once at the start of every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Upload,
    List,
    Download,
    /// Any selector outside the recognized set. Never transmitted.
    Invalid,
}

impl Command {
    /// Classify a selector. Unknown values are `Invalid`, not an error.
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => Command::Upload,
            205 => Command::List,
            210 => Command::Download,
            _ => Command::Invalid,
        }
    }

    /// The wire selector for this command. `Invalid` has none and maps
    /// to 0, which the server classifies back to `Invalid`.
    pub fn code(self) -> u16 {
        match self {
            Command::Upload => 200,
            Command::List => 205,
            Command::Download => 210,
            Command::Invalid => 0,
        }
    }
}

/// Read a fixed-width unsigned big-endian integer field.
///
/// The 10-byte width (list payload sizes) must have its leading bytes
/// zero to fit `u64`; anything else is malformed.
pub async fn read_uint<R>(reader: &mut R, width: usize) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    debug_assert!(width > 0 && width <= 16);
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf[..width]).await?;
    let (high, low) = buf[..width].split_at(width.saturating_sub(8));
    if high.iter().any(|&b| b != 0) {
        return Err(TransferError::Protocol(format!(
            "integer field of width {width} exceeds u64"
        )));
    }
    let mut value = 0u64;
    for &b in low {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

/// Append a fixed-width unsigned big-endian integer field to `buf`.
/// `value` must fit in `width` bytes.
pub fn put_uint(buf: &mut BytesMut, value: u64, width: usize) {
    debug_assert!(width > 0 && width <= 16);
    debug_assert!(width >= 8 || value >> (8 * width) == 0);
    let be = value.to_be_bytes();
    if width > 8 {
        buf.put_bytes(0, width - 8);
        buf.put_slice(&be);
    } else {
        buf.put_slice(&be[8 - width..]);
    }
}

/// Write a fixed-width unsigned big-endian integer field to `writer`.
pub async fn write_uint<W>(writer: &mut W, value: u64, width: usize) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(width);
    put_uint(&mut buf, value, width);
    writer.write_all(&buf).await
}

/// Send a 2-byte status code, the only payload of several responses.
pub async fn send_status<W>(writer: &mut W, status: u16) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&status.to_be_bytes()).await
}

/// Read a 2-byte status code.
pub async fn read_status<R>(reader: &mut R) -> Result<u16, TransferError>
where
    R: AsyncRead + Unpin,
{
    Ok(read_uint(reader, 2).await? as u16)
}

/// Append a length-prefixed string field. The prefix width is 1 for
/// file names and 2 for download queries; `s` must fit the prefix.
pub fn put_string(buf: &mut BytesMut, s: &str, prefix_width: usize) {
    put_uint(buf, s.len() as u64, prefix_width);
    buf.put_slice(s.as_bytes());
}

/// Read a length-prefixed UTF-8 string field.
pub async fn read_string<R>(reader: &mut R, prefix_width: usize) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let len = read_uint(reader, prefix_width).await? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map_err(|_| TransferError::Protocol("string field is not valid UTF-8".into()))
}

/// Encode one list payload: `name<::>mtime(8)<::>size(8)`.
///
/// The integer fields are raw big-endian bytes, not text. The entry name
/// must not contain the delimiter; the store enforces this at upload
/// time.
pub fn encode_entry(entry: &StoreEntry) -> Vec<u8> {
    let delim = FIELD_DELIMITER.as_bytes();
    let mut payload = Vec::with_capacity(entry.name.len() + 2 * delim.len() + 16);
    payload.extend_from_slice(entry.name.as_bytes());
    payload.extend_from_slice(delim);
    payload.extend_from_slice(&entry.modified_at.to_be_bytes());
    payload.extend_from_slice(delim);
    payload.extend_from_slice(&entry.size.to_be_bytes());
    payload
}

/// Decode one list payload.
///
/// Decoding is positional: the name length is derivable from the payload
/// length, so the delimiters are verified at fixed offsets rather than
/// scanned for. Scanning would be ambiguous because the raw integer
/// bytes may coincidentally contain the delimiter sequence.
pub fn decode_entry(payload: &[u8]) -> Result<StoreEntry, TransferError> {
    let delim = FIELD_DELIMITER.as_bytes();
    let fixed = 2 * delim.len() + 16;
    if payload.len() <= fixed {
        return Err(TransferError::Protocol(format!(
            "list payload of {} bytes is too short",
            payload.len()
        )));
    }
    let name_len = payload.len() - fixed;
    let (name, rest) = payload.split_at(name_len);
    if &rest[..delim.len()] != delim
        || &rest[delim.len() + 8..2 * delim.len() + 8] != delim
    {
        return Err(TransferError::Protocol(
            "list payload delimiters out of place".into(),
        ));
    }
    let name = std::str::from_utf8(name)
        .map_err(|_| TransferError::Protocol("entry name is not valid UTF-8".into()))?
        .to_string();
    let mut modified_at = [0u8; 8];
    modified_at.copy_from_slice(&rest[delim.len()..delim.len() + 8]);
    let mut size = [0u8; 8];
    size.copy_from_slice(&rest[2 * delim.len() + 8..]);
    Ok(StoreEntry {
        name,
        modified_at: u64::from_be_bytes(modified_at),
        size: u64::from_be_bytes(size),
    })
}
