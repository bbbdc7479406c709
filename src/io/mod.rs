//! Random-access byte sources backing an archive.
//!
//! The ZIP parser only ever needs positional reads, so every source is
//! expressed through [`ReadAt`]. Local files use `pread`, remote archives use
//! HTTP Range requests, and [`MemoryReader`] serves archives that are already
//! in memory.

mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    ///
    /// May return fewer bytes than requested; a return of zero means the
    /// offset is at or past the end of the source.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely starting at `offset`
    ///
    /// Fails if the source ends before the buffer is full, so callers never
    /// see a partially initialised buffer as if it were valid data.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                bail!(
                    "Unexpected end of data at offset {} ({} of {} bytes read)",
                    offset + filled as u64,
                    filled,
                    buf.len()
                );
            }
            filled += n;
        }
        Ok(())
    }
}
