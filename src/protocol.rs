//! Shared protocol constants for the scp wire format

// Response bytes (first byte of an acknowledgement)
pub mod response {
    pub const OK: u8 = 0x00;
    pub const WARNING: u8 = 0x01;
    pub const FATAL: u8 = 0x02;
}

// Control-line tags
pub mod tag {
    pub const FILE: u8 = b'C';
    pub const DIR_ENTER: u8 = b'D';
    pub const DIR_EXIT: u8 = b'E';
}

// Maximum control/error line length (64KB) - prevents memory exhaustion from a peer
// that never sends a newline
pub const MAX_LINE_LEN: usize = 64 * 1024;

// Only permission bits travel on the wire
pub const MODE_MASK: u32 = 0o7777;

// Buffer used when copying file payloads between the channel and disk
pub const COPY_BUF_SIZE: usize = 64 * 1024;

/// Copy buffer length for a payload of `size` bytes. Compared in `u64` so a
/// large size never wraps on 32-bit targets.
pub fn copy_buf_len(size: u64) -> usize {
    size.clamp(1, COPY_BUF_SIZE as u64) as usize
}

// Capacity of the in-memory pipes that front a remote process's stdio
pub const PIPE_CAPACITY: usize = 256 * 1024;

// Remote side defaults
pub const DEFAULT_REMOTE_BINARY: &str = "/usr/bin/scp";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

pub mod timeouts {
    // Connection establishment timeout (s)
    pub const CONNECT_SECS: u64 = 10;
}

// Modes used when the platform has no POSIX permission bits to report
pub const FALLBACK_FILE_MODE: u32 = 0o644;
pub const FALLBACK_DIR_MODE: u32 = 0o755;
