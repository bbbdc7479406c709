/// Kind of a node in the mounted tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Attributes of a node, independent of any kernel protocol
///
/// `mode` holds permission bits only; the file type lives in `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: NodeKind,
    pub mode: u32,
    pub size: u64,
}

impl Attr {
    pub fn file(mode: u32, size: u64) -> Self {
        Self {
            kind: NodeKind::File,
            mode,
            size,
        }
    }

    pub fn directory(mode: u32) -> Self {
        Self {
            kind: NodeKind::Directory,
            mode,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}
