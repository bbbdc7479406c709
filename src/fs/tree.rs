//! Assembly of the directory tree from a flat [`EntryMap`].

use std::collections::BTreeMap;
use std::sync::Arc;

use super::attr::{Attr, NodeKind};
use super::file::LazyFile;
use super::map::EntryMap;
use crate::config::READ_EXECUTE_MODE;

/// A child of a directory
#[derive(Clone)]
pub enum Node {
    Dir(Arc<DirNode>),
    File(Arc<LazyFile>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn stat(&self) -> Attr {
        match self {
            Node::Dir(dir) => dir.stat(),
            Node::File(file) => file.stat(),
        }
    }

    pub fn as_dir(&self) -> Option<&Arc<DirNode>> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<LazyFile>> {
        match self {
            Node::File(file) => Some(file),
            Node::Dir(_) => None,
        }
    }
}

/// One directory level. Immutable once built.
pub struct DirNode {
    name: String,
    children: BTreeMap<String, Node>,
}

impl DirNode {
    /// Segment name, or the display name for the root
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact, case-sensitive child lookup
    pub fn lookup(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Children as `(name, kind)`, sorted by name
    pub fn list(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.children
            .iter()
            .map(|(name, node)| (name.as_str(), node.kind()))
    }

    pub fn stat(&self) -> Attr {
        Attr::directory(READ_EXECUTE_MODE)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Display name of the root for an archive opened from `source`
pub fn root_name(source: &str) -> String {
    format!("fs({})", source)
}

/// Build the directory tree for `map`
///
/// All directories are created first: explicit markers and every parent of
/// every file. Files are attached afterwards, and a file whose name is
/// already taken by a directory is dropped. Directories therefore win any
/// file/directory collision regardless of archive order.
pub fn build_tree(root_name: impl Into<String>, map: &EntryMap) -> Arc<DirNode> {
    let mut root = PendingDir::default();

    for dir in map.directories() {
        let segments: Vec<&str> = split_segments(dir).collect();
        root.descend(&segments);
    }
    for (path, _) in map.files() {
        let mut segments: Vec<&str> = split_segments(path).collect();
        segments.pop();
        root.descend(&segments);
    }

    let mut attached = 0usize;
    for (path, file) in map.files() {
        let mut segments: Vec<&str> = split_segments(path).collect();
        let Some(leaf) = segments.pop() else {
            continue;
        };
        let Some(parent) = root.descend(&segments) else {
            tracing::warn!(path, "parent of file is not a directory, skipping");
            continue;
        };
        if parent.children.contains_key(leaf) {
            tracing::warn!(path, "file shadowed by directory of the same name, skipping");
            continue;
        }
        parent
            .children
            .insert(leaf.to_string(), Pending::File(Arc::clone(file)));
        attached += 1;
    }

    let root = Arc::new(root.freeze(root_name.into()));
    tracing::debug!(
        root = root.name(),
        files = attached,
        skipped = map.len() - attached,
        "built directory tree"
    );
    root
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Mutable directory used only while the tree is assembled
#[derive(Default)]
struct PendingDir {
    children: BTreeMap<String, Pending>,
}

enum Pending {
    Dir(PendingDir),
    File(Arc<LazyFile>),
}

impl PendingDir {
    /// Walk down `segments`, creating missing directories
    ///
    /// Returns `None` if a segment names a file.
    fn descend(&mut self, segments: &[&str]) -> Option<&mut PendingDir> {
        let mut dir = self;
        for segment in segments {
            dir = match dir
                .children
                .entry((*segment).to_string())
                .or_insert_with(|| Pending::Dir(PendingDir::default()))
            {
                Pending::Dir(next) => next,
                Pending::File(_) => return None,
            };
        }
        Some(dir)
    }

    fn freeze(self, name: String) -> DirNode {
        let children = self
            .children
            .into_iter()
            .map(|(child_name, pending)| {
                let node = match pending {
                    Pending::Dir(dir) => Node::Dir(Arc::new(dir.freeze(child_name.clone()))),
                    Pending::File(file) => Node::File(file),
                };
                (child_name, node)
            })
            .collect();
        DirNode { name, children }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionPolicy;
    use crate::fs::entry::ArchiveEntry;
    use crate::fs::file::tests::CountingEntry;

    fn map_of(paths: &[&str]) -> EntryMap {
        let entries: Vec<Arc<dyn ArchiveEntry>> = paths
            .iter()
            .map(|p| Arc::new(CountingEntry::new(p, p.as_bytes())) as Arc<dyn ArchiveEntry>)
            .collect();
        EntryMap::from_entries(entries, PermissionPolicy::default())
    }

    fn names(dir: &DirNode) -> Vec<(&str, NodeKind)> {
        dir.list().collect()
    }

    fn dir<'a>(parent: &'a DirNode, name: &str) -> &'a Arc<DirNode> {
        parent.lookup(name).and_then(Node::as_dir).unwrap()
    }

    #[test]
    fn test_path_partition() {
        let root = build_tree("fs(test.zip)", &map_of(&["a/b/c.txt", "a/d.txt", "x.txt"]));

        assert_eq!(root.name(), "fs(test.zip)");
        assert_eq!(
            names(&root),
            vec![("a", NodeKind::Directory), ("x.txt", NodeKind::File)]
        );

        let a = dir(&root, "a");
        assert_eq!(a.name(), "a");
        assert_eq!(
            names(a),
            vec![("b", NodeKind::Directory), ("d.txt", NodeKind::File)]
        );

        let b = dir(a, "b");
        assert_eq!(names(b), vec![("c.txt", NodeKind::File)]);
        assert_eq!(
            b.lookup("c.txt").and_then(Node::as_file).unwrap().path(),
            "a/b/c.txt"
        );
    }

    #[tokio::test]
    async fn test_leaves_keep_their_entry() {
        let root = build_tree("root", &map_of(&["x.txt"]));
        let file = root.lookup("x.txt").and_then(Node::as_file).unwrap();
        assert_eq!(&*file.data().await.unwrap(), b"x.txt");
    }

    #[test]
    fn test_normalized_paths_share_location() {
        let root = build_tree("root", &map_of(&["a//b/./c.txt"]));
        let b = dir(dir(&root, "a"), "b");
        assert!(b.lookup("c.txt").is_some());
    }

    #[test]
    fn test_directory_marker_creates_empty_dir() {
        let root = build_tree("root", &map_of(&["empty/", "nested/deep/", "f.txt"]));
        let empty = dir(&root, "empty");
        assert!(empty.is_empty());
        assert!(dir(dir(&root, "nested"), "deep").is_empty());
        assert_eq!(root.len(), 3);
    }

    #[test]
    fn test_empty_archive() {
        let root = build_tree("root", &EntryMap::new());
        assert!(root.is_empty());
        assert_eq!(root.list().count(), 0);
        assert!(root.stat().is_dir());
    }

    #[test]
    fn test_lookup_is_exact_and_case_sensitive() {
        let root = build_tree("root", &map_of(&["Readme.md"]));
        assert!(root.lookup("Readme.md").is_some());
        assert!(root.lookup("readme.md").is_none());
        assert!(root.lookup("Readme").is_none());
        assert!(root.lookup("").is_none());
    }

    #[test]
    fn test_directory_wins_collision_in_either_order() {
        for paths in [["a", "a/b"], ["a/b", "a"]] {
            let root = build_tree("root", &map_of(&paths));
            let a = root.lookup("a").unwrap();
            assert_eq!(a.kind(), NodeKind::Directory);
            assert!(a.as_dir().unwrap().lookup("b").is_some());
        }
    }

    #[test]
    fn test_directory_attributes() {
        let root = build_tree("root", &map_of(&["d/f"]));
        let attr = root.lookup("d").unwrap().stat();
        assert_eq!(attr.kind, NodeKind::Directory);
        assert_eq!(attr.mode, 0o555);
        assert_eq!(attr.size, 0);
    }
}
