//! Errors surfaced by the mounted filesystem.

use thiserror::Error;

/// Failure to produce a file's contents
///
/// Every variant means the archive member could not be turned into exactly
/// the bytes the archive promised. The error is cloneable so that every
/// reader waiting on the same decompression receives it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The entry's stream could not be opened (fetch failure, unsupported
    /// method, encrypted entry).
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// The stream ended before the recorded uncompressed size
    #[error("Short read for {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The stream kept producing bytes past the recorded size
    #[error("{path} is larger than the {expected} bytes recorded in the archive")]
    TrailingData { path: String, expected: u64 },

    /// Decompressed bytes do not match the archive's CRC-32
    #[error("Checksum mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    /// Decompression itself failed (corrupt deflate stream, I/O error)
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },
}

impl FsError {
    /// Archive path of the entry that failed
    pub fn path(&self) -> &str {
        match self {
            FsError::Open { path, .. }
            | FsError::ShortRead { path, .. }
            | FsError::TrailingData { path, .. }
            | FsError::ChecksumMismatch { path, .. }
            | FsError::Io { path, .. } => path,
        }
    }

    /// Errno reported to the kernel
    ///
    /// All of these are integrity faults of the backing archive, which
    /// userspace sees as `EIO`.
    pub fn errno(&self) -> i32 {
        libc::EIO
    }
}
