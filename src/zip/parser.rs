//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. When an entry is opened, read its Local File Header to find the data
//!
//! Listing therefore only touches the archive's tail, which keeps mounting a
//! remote archive down to a couple of Range requests.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes)
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser
///
/// Generic over the reader type so local files, HTTP sources and in-memory
/// buffers share one code path. Usually driven through
/// [`ZipArchive`](super::ZipArchive).
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record
    ///
    /// Returns the record together with its offset in the archive. Archives
    /// with a trailing comment are handled by scanning backwards for the
    /// signature.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Fast path: no comment, EOCD is the last 22 bytes.
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf).await?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        if buf.len() >= EndOfCentralDirectory::SIZE {
            for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
                if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                    continue;
                }
                // A real EOCD's comment runs exactly to the end of the file.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record
    ///
    /// Called when the regular EOCD has saturated fields. The locator sits
    /// immediately before the regular EOCD.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .context("Missing ZIP64 End of Central Directory Locator")?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator.total_disks > 1 {
            bail!("Multi-disk archives are not supported");
        }

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries of the archive, directories included
    ///
    /// The whole central directory is fetched with a single read and parsed
    /// in memory.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if eocd.is_multi_disk() {
            bail!("Multi-disk archives are not supported");
        }

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            bail!(
                "Central Directory ({} bytes at offset {}) extends past end of archive ({} bytes)",
                cd_size,
                cd_offset,
                self.size
            );
        }
        // Every header is at least 46 bytes; reject counts the directory cannot hold.
        if total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            bail!(
                "Central Directory too small for {} entries ({} bytes)",
                total_entries,
                cd_size
            );
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total_entries {
            let entry = Self::parse_cdfh(&mut cursor)
                .with_context(|| format!("Corrupt Central Directory entry #{}", index))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse one Central Directory File Header, leaving the cursor on the
    /// next header.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Non-UTF8 names are kept, with replacement characters
        let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();
        let is_directory = file_name.ends_with('/');

        let extra_field_end = cursor.position() + extra_field_length as u64;
        if extra_field_end > cursor.get_ref().len() as u64 {
            bail!("Extra field runs past end of Central Directory");
        }

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = (cursor.position() + field_size).min(extra_field_end);

            if header_id == ZIP64_EXTRA_ID {
                // Only the saturated header fields are present, in this order
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end);
        }

        cursor.set_position(extra_field_end + file_comment_length as u64);

        Ok(ZipFileEntry {
            file_name,
            version_made_by,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            external_attrs,
            lfh_offset,
            is_directory,
        })
    }

    /// Offset of an entry's compressed bytes
    ///
    /// The Local File Header's name and extra field may differ in length from
    /// the Central Directory copy, so the LFH itself has to be read.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader
            .read_exact_at(entry.lfh_offset, &mut lfh_buf)
            .await
            .with_context(|| format!("Failed to read Local File Header of {}", entry.file_name))?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // file name length

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;
        if data_offset.saturating_add(entry.compressed_size) > self.size {
            bail!("Data of {} extends past end of archive", entry.file_name);
        }

        Ok(data_offset)
    }

    /// Read an entry's raw (still compressed) bytes
    pub async fn read_compressed(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let data_offset = self.get_data_offset(entry).await?;
        let mut buf = vec![0u8; entry.compressed_size as usize];
        self.reader.read_exact_at(data_offset, &mut buf).await?;
        Ok(buf)
    }
}
