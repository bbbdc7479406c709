//! FUSE adapter for the archive tree.
//!
//! `fuser` speaks in inode numbers while the tree is keyed by name, so the
//! adapter flattens the tree once into an inode table. Inode 1 is the root;
//! the rest are assigned breadth-first in listing order.
//!
//! Every callback runs on the session thread. Reads are answered from a task
//! on the tokio runtime, so a slow first decompression only holds up readers
//! of that file.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    BackgroundSession, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use tokio::runtime::Handle;

use super::attr::{Attr, NodeKind};
use super::tree::{DirNode, Node};
use crate::config::MountConfig;

const ROOT_INO: u64 = fuser::FUSE_ROOT_ID;
const BLOCK_SIZE: u32 = 512;
const MAX_NAME_LEN: u32 = 255;

struct Inode {
    parent: u64,
    node: Node,
    children: HashMap<String, u64>,
}

/// Read-only filesystem serving an archive tree
pub struct ArchiveFs {
    inodes: Vec<Inode>,
    config: MountConfig,
    runtime: Handle,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
}

impl ArchiveFs {
    /// Index `root` for serving
    ///
    /// `runtime` drives decompression and answers reads.
    pub fn new(root: Arc<DirNode>, config: MountConfig, runtime: Handle) -> Self {
        let mut inodes = vec![Inode {
            parent: ROOT_INO,
            node: Node::Dir(root),
            children: HashMap::new(),
        }];

        let mut queue = VecDeque::from([ROOT_INO]);
        while let Some(ino) = queue.pop_front() {
            let Node::Dir(dir) = inodes[(ino - 1) as usize].node.clone() else {
                continue;
            };
            for (name, kind) in dir.list() {
                let Some(child) = dir.lookup(name) else {
                    continue;
                };
                let child_ino = inodes.len() as u64 + 1;
                inodes.push(Inode {
                    parent: ino,
                    node: child.clone(),
                    children: HashMap::new(),
                });
                inodes[(ino - 1) as usize]
                    .children
                    .insert(name.to_string(), child_ino);
                if kind == NodeKind::Directory {
                    queue.push_back(child_ino);
                }
            }
        }

        tracing::debug!(inodes = inodes.len(), "indexed archive tree");

        Self {
            inodes,
            config,
            runtime,
            mounted_at: SystemTime::now(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Number of inodes, the root included
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    fn get(&self, ino: u64) -> Option<&Inode> {
        ino.checked_sub(1)
            .and_then(|index| self.inodes.get(index as usize))
    }

    fn to_file_attr(&self, ino: u64, attr: Attr) -> FileAttr {
        let kind = match attr.kind {
            NodeKind::File => FileType::RegularFile,
            NodeKind::Directory => FileType::Directory,
        };

        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm: attr.mode as u16,
            nlink: if attr.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn ttl(&self) -> Duration {
        self.config.attr_ttl
    }

    /// Answer a read from a runtime task; returns without waiting for it
    fn read_file<R: DataReply>(&self, ino: u64, offset: i64, size: u32, reply: R) {
        let Some(inode) = self.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Node::File(file) = &inode.node else {
            reply.error(libc::EISDIR);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let file = Arc::clone(file);
        self.runtime.spawn(async move {
            match file.data().await {
                Ok(data) => reply.data(read_window(&data, offset as u64, size)),
                Err(e) => {
                    tracing::error!(path = file.path(), error = %e, "read failed");
                    reply.error(e.errno());
                }
            }
        });
    }
}

/// The two ways a read can be answered
trait DataReply: Send + 'static {
    fn data(self, data: &[u8]);
    fn error(self, errno: i32);
}

impl DataReply for ReplyData {
    fn data(self, data: &[u8]) {
        ReplyData::data(self, data)
    }

    fn error(self, errno: i32) {
        ReplyData::error(self, errno)
    }
}

impl Filesystem for ArchiveFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(parent_inode) = self.get(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Node::Dir(dir) = &parent_inode.node else {
            reply.error(libc::ENOTDIR);
            return;
        };

        match (dir.lookup(name), parent_inode.children.get(name)) {
            (Some(child), Some(&ino)) => {
                let attr = self.to_file_attr(ino, child.stat());
                reply.entry(&self.ttl(), &attr, 0);
            }
            _ => {
                tracing::trace!(parent, name, "lookup miss");
                reply.error(libc::ENOENT);
            }
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.get(ino) {
            Some(inode) => {
                let attr = self.to_file_attr(ino, inode.node.stat());
                reply.attr(&self.ttl(), &attr);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.get(ino).map(|inode| inode.node.kind()) {
            None => reply.error(libc::ENOENT),
            Some(NodeKind::Directory) => reply.error(libc::EISDIR),
            Some(NodeKind::File) if flags & libc::O_ACCMODE != libc::O_RDONLY => {
                reply.error(libc::EROFS)
            }
            Some(NodeKind::File) => reply.opened(0, 0),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        self.read_file(ino, offset, size, reply);
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.get(ino).map(|inode| inode.node.kind()) {
            Some(NodeKind::Directory) => reply.opened(0, 0),
            Some(NodeKind::File) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(inode) = self.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Node::Dir(dir) = &inode.node else {
            reply.error(libc::ENOTDIR);
            return;
        };

        let mut entries: Vec<(u64, FileType, &str)> = vec![
            (ino, FileType::Directory, "."),
            (inode.parent, FileType::Directory, ".."),
        ];
        for (name, kind) in dir.list() {
            let Some(&child_ino) = inode.children.get(name) else {
                continue;
            };
            let file_type = match kind {
                NodeKind::File => FileType::RegularFile,
                NodeKind::Directory => FileType::Directory,
            };
            entries.push((child_ino, file_type, name));
        }

        for (next, (entry_ino, kind, name)) in resume_from(&entries, offset) {
            if reply.add(*entry_ino, next, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let blocks: u64 = self
            .inodes
            .iter()
            .map(|inode| inode.node.stat().size.div_ceil(BLOCK_SIZE as u64))
            .sum();
        reply.statfs(
            blocks,
            0,
            0,
            self.inodes.len() as u64,
            0,
            BLOCK_SIZE,
            MAX_NAME_LEN,
            BLOCK_SIZE,
        );
    }
}

/// The part of `data` a read of `size` bytes at `offset` returns; empty at
/// or past the end.
fn read_window(data: &[u8], offset: u64, size: u32) -> &[u8] {
    let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
    let end = start.saturating_add(size as usize).min(data.len());
    &data[start..end]
}

/// Directory entries still to send after `offset`, each paired with the
/// offset the kernel passes back to continue after it.
fn resume_from<T>(entries: &[T], offset: i64) -> impl Iterator<Item = (i64, &T)> {
    let skip = usize::try_from(offset).unwrap_or(0);
    entries
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, entry)| (i as i64 + 1, entry))
}

fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.fs_name.clone()),
        MountOption::Subtype("zipmount".to_string()),
        MountOption::RO,
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Mount `fs` at `mountpoint` on a background thread
///
/// The filesystem stays mounted until the returned session is dropped.
pub fn spawn_mount(
    fs: ArchiveFs,
    mountpoint: &Path,
    config: &MountConfig,
) -> std::io::Result<BackgroundSession> {
    fuser::spawn_mount2(fs, mountpoint, &mount_options(config))
}
