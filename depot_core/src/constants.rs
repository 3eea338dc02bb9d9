use std::time::Duration;

/// Default TCP port the transfer server listens on
pub const TRANSFER_PORT: u16 = 2499;

/// Buffer size for hashing and local file reads (64 KiB)
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Receive increment for socket payload reads
pub const RECV_CHUNK: usize = 1024;

/// Idle-read timeout; a peer that stalls longer than this is dropped
pub const READ_TIMEOUT: Duration = Duration::from_secs(35);

/// Delimiter joining the name/mtime/size fields of a list payload.
/// Store entry names must never contain this sequence.
pub const FIELD_DELIMITER: &str = "<::>";
