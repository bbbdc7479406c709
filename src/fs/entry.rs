use anyhow::Result;
use async_trait::async_trait;
use std::io::Read;

/// One member of an archive, as seen by the filesystem tree
///
/// Descriptors are immutable for the life of the process. `open_stream` may
/// be called more than once; every call yields a fresh stream over the
/// member's uncompressed bytes.
#[async_trait]
pub trait ArchiveEntry: Send + Sync {
    /// Path as stored in the archive, before normalization
    fn path(&self) -> &str;

    fn uncompressed_size(&self) -> u64;

    fn compressed_size(&self) -> u64;

    /// Permission bits recorded by the archiver
    fn permission_hint(&self) -> u32;

    /// CRC-32 of the uncompressed bytes, when the container records one
    fn crc32(&self) -> Option<u32> {
        None
    }

    /// Open a stream producing exactly `uncompressed_size` bytes
    ///
    /// Any remote fetching happens here; the returned reader only inflates.
    async fn open_stream(&self) -> Result<Box<dyn Read + Send>>;
}
