//! # zipmount
//!
//! Mount a ZIP archive as a read-only filesystem, with lazy decompression.
//!
//! The archive can live on the local filesystem or behind an HTTP server that
//! supports Range requests. Mounting only reads the central directory; each
//! member is fetched and decompressed the first time it is read, then kept in
//! memory for the rest of the mount.
//!
//! ## Features
//!
//! - Local files and HTTP/HTTPS URLs (Range requests)
//! - ZIP64 archives
//! - STORED and DEFLATE members, verified against their CRC-32
//! - One decompression per file, shared by all concurrent readers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipmount::{ArchiveEntry, EntryMap, LocalFileReader, PermissionPolicy, ZipArchive, build_tree};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new("archive.zip".as_ref())?);
//!     let archive = ZipArchive::open(reader).await?;
//!
//!     let entries = archive
//!         .entries()
//!         .iter()
//!         .map(|e| Arc::clone(e) as Arc<dyn ArchiveEntry>);
//!     let map = EntryMap::from_entries(entries, PermissionPolicy::default());
//!     let root = build_tree("fs(archive.zip)", &map);
//!
//!     for (name, kind) in root.list() {
//!         println!("{:?} {}", kind, name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod io;
pub mod logging;
pub mod units;
pub mod zip;

pub use cli::Cli;
pub use config::{MountConfig, PermissionPolicy};
pub use error::FsError;
pub use fs::{ArchiveEntry, Attr, DirNode, EntryMap, LazyFile, Node, NodeKind, build_tree};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use zip::{ZipArchive, ZipEntry, ZipFileEntry};
