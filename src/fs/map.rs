//! Path to entry map, the flat input to tree building.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::entry::ArchiveEntry;
use super::file::LazyFile;
use super::path::{PathError, normalize};
use crate::config::PermissionPolicy;

/// Flat view of an archive: normalized path to file, plus the directories
/// the archive declares explicitly.
///
/// Keys are unique. When two archive paths normalize to the same key, the
/// one inserted last wins.
#[derive(Default)]
pub struct EntryMap {
    files: BTreeMap<String, Arc<LazyFile>>,
    directories: BTreeSet<String>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from archive entries in archive order
    ///
    /// Paths ending in `/` are directory markers and contribute no file.
    /// Paths that are empty or escape the root are skipped with a warning.
    pub fn from_entries<I>(entries: I, policy: PermissionPolicy) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ArchiveEntry>>,
    {
        let mut map = Self::new();
        for entry in entries {
            let path = entry.path().to_string();
            if path.ends_with('/') {
                map.insert_directory(&path);
            } else {
                map.insert_file(&path, Arc::new(LazyFile::with_policy(entry, policy)));
            }
        }
        map
    }

    /// Insert a file under the normalized form of `path`
    ///
    /// Returns `false` when the path was rejected.
    pub fn insert_file(&mut self, path: &str, file: Arc<LazyFile>) -> bool {
        match normalize(path) {
            Ok(key) => {
                if self.files.insert(key, file).is_some() {
                    tracing::warn!(path, "duplicate archive path, keeping the later entry");
                }
                true
            }
            Err(e) => {
                tracing::warn!(path, reason = %e, "skipping archive entry");
                false
            }
        }
    }

    /// Record an explicit directory
    ///
    /// A marker for the root itself (`/` or `./`) is accepted and ignored.
    pub fn insert_directory(&mut self, path: &str) -> bool {
        match normalize(path) {
            Ok(key) => {
                self.directories.insert(key);
                true
            }
            Err(PathError::Empty) => true,
            Err(e) => {
                tracing::warn!(path, reason = %e, "skipping directory entry");
                false
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&Arc<LazyFile>> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &Arc<LazyFile>)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.directories.iter().map(String::as_str)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::file::tests::CountingEntry;

    fn entry(path: &str) -> Arc<dyn ArchiveEntry> {
        Arc::new(CountingEntry::new(path, path.as_bytes()))
    }

    #[test]
    fn test_keys_are_normalized() {
        let map = EntryMap::from_entries(
            vec![entry("a//b/./c.txt"), entry("/x.txt")],
            PermissionPolicy::default(),
        );
        assert!(map.get("a/b/c.txt").is_some());
        assert!(map.get("x.txt").is_some());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_directory_markers_are_not_files() {
        let map = EntryMap::from_entries(
            vec![entry("docs/"), entry("docs/readme.md")],
            PermissionPolicy::default(),
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.directories().collect::<Vec<_>>(), vec!["docs"]);
    }

    #[test]
    fn test_hostile_and_empty_paths_are_skipped() {
        let mut map = EntryMap::new();
        let file = Arc::new(LazyFile::new(entry("../evil")));
        assert!(!map.insert_file("../evil", file.clone()));
        assert!(!map.insert_file("", file.clone()));
        assert!(!map.insert_directory("../outside/"));
        assert!(map.insert_directory("./"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_last_duplicate_wins() {
        let first = Arc::new(LazyFile::new(entry("dup.txt")));
        let second = Arc::new(LazyFile::new(entry("./dup.txt")));
        let mut map = EntryMap::new();
        map.insert_file("dup.txt", first);
        map.insert_file("./dup.txt", second.clone());
        assert_eq!(map.len(), 1);
        assert!(Arc::ptr_eq(map.get("dup.txt").unwrap(), &second));
    }
}
