//! The mounted view of an archive.
//!
//! ## Architecture
//!
//! ```text
//! FUSE adapter   (ArchiveFs: inode table, fuser::Filesystem)
//! Tree           (DirNode / Node, built once by build_tree)
//! Flat map       (EntryMap: normalized path -> LazyFile)
//! Leaves         (LazyFile: memoized decompression of one ArchiveEntry)
//! ```
//!
//! Everything above [`LazyFile`] is immutable once built and is shared
//! between FUSE requests without locking. The only mutable state is each
//! file's decompression cache.

mod attr;
mod entry;
mod file;
#[cfg(feature = "fuse")]
mod fuse;
mod map;
mod path;
mod tree;

pub use attr::{Attr, NodeKind};
pub use entry::ArchiveEntry;
pub use file::LazyFile;
#[cfg(feature = "fuse")]
pub use fuse::{ArchiveFs, spawn_mount};
pub use map::EntryMap;
pub use path::{PathError, normalize};
pub use tree::{DirNode, Node, build_tree, root_name};
