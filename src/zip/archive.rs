use async_trait::async_trait;
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::fs::ArchiveEntry;
use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// An opened ZIP archive with its central directory parsed
pub struct ZipArchive<R: ReadAt> {
    entries: Vec<Arc<ZipEntry<R>>>,
}

impl<R: ReadAt> ZipArchive<R> {
    /// Parse the central directory of the archive behind `reader`
    ///
    /// Fails on I/O errors and on anything that is not a well-formed,
    /// single-disk ZIP archive. Entry contents are not touched.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let parser = Arc::new(ZipParser::new(reader));
        let files = parser.list_files().await?;

        tracing::debug!(entries = files.len(), "parsed central directory");

        let entries = files
            .into_iter()
            .map(|meta| {
                Arc::new(ZipEntry {
                    parser: Arc::clone(&parser),
                    meta,
                })
            })
            .collect();

        Ok(Self { entries })
    }

    /// All entries in central directory order, directories included
    pub fn entries(&self) -> &[Arc<ZipEntry<R>>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single archive member bound to the parser that can fetch its data
pub struct ZipEntry<R: ReadAt> {
    parser: Arc<ZipParser<R>>,
    meta: ZipFileEntry,
}

impl<R: ReadAt> ZipEntry<R> {
    pub fn meta(&self) -> &ZipFileEntry {
        &self.meta
    }
}

#[async_trait]
impl<R: ReadAt + 'static> ArchiveEntry for ZipEntry<R> {
    fn path(&self) -> &str {
        &self.meta.file_name
    }

    fn uncompressed_size(&self) -> u64 {
        self.meta.uncompressed_size
    }

    fn compressed_size(&self) -> u64 {
        self.meta.compressed_size
    }

    fn permission_hint(&self) -> u32 {
        self.meta.permission_bits()
    }

    fn crc32(&self) -> Option<u32> {
        Some(self.meta.crc32)
    }

    async fn open_stream(&self) -> Result<Box<dyn Read + Send>> {
        if self.meta.is_encrypted() {
            bail!("Encrypted entries are not supported: {}", self.meta.file_name);
        }

        // The method is checked before anything is fetched over the network
        match self.meta.compression_method {
            CompressionMethod::Stored => {
                if self.meta.compressed_size != self.meta.uncompressed_size {
                    bail!(
                        "Stored entry {} declares {} bytes but holds {}",
                        self.meta.file_name,
                        self.meta.uncompressed_size,
                        self.meta.compressed_size
                    );
                }
                let raw = self.parser.read_compressed(&self.meta).await?;
                Ok(Box::new(Cursor::new(raw)))
            }
            CompressionMethod::Deflate => {
                let raw = self.parser.read_compressed(&self.meta).await?;
                Ok(Box::new(DeflateDecoder::new(Cursor::new(raw))))
            }
            CompressionMethod::Unknown(code) => bail!(
                "Unsupported compression method {} for {} (only STORED and DEFLATE are supported)",
                code,
                self.meta.file_name
            ),
        }
    }
}
