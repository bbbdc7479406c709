//! ZIP archive parsing.
//!
//! This module reads ZIP archives through any [`ReadAt`](crate::io::ReadAt)
//! source, supporting both the standard format and ZIP64 extensions.
//!
//! ## Architecture
//!
//! - [`structures`]: data structures for ZIP format elements (EOCD, headers)
//! - [`parser`]: low-level parsing of those structures from raw bytes
//! - [`archive`]: [`ZipArchive`] and [`ZipEntry`], the entry descriptors
//!   handed to the filesystem tree
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Only the EOCD and Central Directory are read when an archive is opened.
//! Member data is fetched when a [`ZipEntry`] stream is opened, which is what
//! makes mounting a remote archive cheap.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod archive;
mod parser;
mod structures;

pub use archive::{ZipArchive, ZipEntry};
pub use parser::ZipParser;
pub use structures::*;
