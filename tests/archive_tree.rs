use anyhow::Result;
use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use zipmount::{
    ArchiveEntry, DirNode, EntryMap, FsError, LocalFileReader, MemoryReader, Node, NodeKind,
    PermissionPolicy, ReadAt, ZipArchive, build_tree,
};

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

struct TestFile {
    name: String,
    data: Vec<u8>,
    method: u16,
    flags: u16,
    unix_mode: Option<u32>,
}

impl TestFile {
    fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            method: METHOD_STORED,
            flags: 0,
            unix_mode: None,
        }
    }

    fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            method: METHOD_DEFLATE,
            ..Self::stored(name, data)
        }
    }

    fn dir(name: &str) -> Self {
        Self::stored(name, b"")
    }
}

/// Minimal ZIP writer: local headers, central directory, EOCD.
fn build_zip(files: &[TestFile], comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for file in files {
        let mut crc = flate2::Crc::new();
        crc.update(&file.data);
        let payload = match file.method {
            METHOD_DEFLATE => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&file.data).unwrap();
                encoder.finish().unwrap()
            }
            _ => file.data.clone(),
        };
        let (version_made_by, external_attrs) = match file.unix_mode {
            Some(mode) => ((3u16 << 8) | 20, (0o100000 | mode) << 16),
            None => (20u16, 0u32),
        };
        let lfh_offset = out.len() as u32;

        out.write_all(b"PK\x03\x04").unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(file.flags).unwrap();
        out.write_u16::<LittleEndian>(file.method).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(crc.sum()).unwrap();
        out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(file.data.len() as u32).unwrap();
        out.write_u16::<LittleEndian>(file.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_all(file.name.as_bytes()).unwrap();
        out.write_all(&payload).unwrap();

        central.write_all(b"PK\x01\x02").unwrap();
        central.write_u16::<LittleEndian>(version_made_by).unwrap();
        central.write_u16::<LittleEndian>(20).unwrap();
        central.write_u16::<LittleEndian>(file.flags).unwrap();
        central.write_u16::<LittleEndian>(file.method).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u32::<LittleEndian>(crc.sum()).unwrap();
        central.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        central.write_u32::<LittleEndian>(file.data.len() as u32).unwrap();
        central.write_u16::<LittleEndian>(file.name.len() as u16).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u32::<LittleEndian>(external_attrs).unwrap();
        central.write_u32::<LittleEndian>(lfh_offset).unwrap();
        central.write_all(file.name.as_bytes()).unwrap();
    }

    let cd_offset = out.len() as u32;
    out.write_all(&central).unwrap();

    out.write_all(b"PK\x05\x06").unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(files.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(files.len() as u16).unwrap();
    out.write_u32::<LittleEndian>(central.len() as u32).unwrap();
    out.write_u32::<LittleEndian>(cd_offset).unwrap();
    out.write_u16::<LittleEndian>(comment.len() as u16).unwrap();
    out.write_all(comment).unwrap();
    out
}

/// Reader that counts how many positional reads reach the archive.
struct CountingReader {
    inner: MemoryReader,
    reads: AtomicUsize,
}

impl CountingReader {
    fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryReader::new(data),
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadAt for CountingReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}

async fn mount_tree<R: ReadAt + 'static>(reader: Arc<R>, policy: PermissionPolicy) -> Arc<DirNode> {
    let archive = ZipArchive::open(reader).await.unwrap();
    let entries = archive
        .entries()
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn ArchiveEntry>);
    let map = EntryMap::from_entries(entries, policy);
    build_tree("fs(test.zip)", &map)
}

fn walk<'a>(root: &'a DirNode, path: &str) -> &'a Node {
    let mut segments: Vec<&str> = path.split('/').collect();
    let leaf = segments.pop().unwrap();
    let mut dir = root;
    for segment in segments {
        dir = dir.lookup(segment).and_then(Node::as_dir).map(|d| &**d).unwrap();
    }
    dir.lookup(leaf).unwrap()
}

async fn read(root: &DirNode, path: &str) -> Result<Arc<[u8]>, FsError> {
    walk(root, path).as_file().unwrap().data().await
}

fn sample_archive() -> Vec<u8> {
    let mut script = TestFile::stored("bin/run.sh", b"#!/bin/sh\necho hi\n");
    script.unix_mode = Some(0o755);
    build_zip(
        &[
            TestFile::dir("a/"),
            TestFile::stored("a/b/c.txt", b"stored contents"),
            TestFile::deflated("a/d.txt", &b"deflated ".repeat(200)),
            TestFile::deflated("x.txt", b""),
            TestFile::dir("empty/"),
            script,
        ],
        b"",
    )
}

#[tokio::test]
async fn test_tree_matches_archive_layout() {
    let root = mount_tree(
        Arc::new(MemoryReader::new(sample_archive())),
        PermissionPolicy::default(),
    )
    .await;

    let names: Vec<_> = root.list().collect();
    assert_eq!(
        names,
        vec![
            ("a", NodeKind::Directory),
            ("bin", NodeKind::Directory),
            ("empty", NodeKind::Directory),
            ("x.txt", NodeKind::File),
        ]
    );
    assert!(walk(&root, "empty").as_dir().unwrap().is_empty());

    let a: Vec<_> = walk(&root, "a").as_dir().unwrap().list().collect();
    assert_eq!(
        a,
        vec![("b", NodeKind::Directory), ("d.txt", NodeKind::File)]
    );
}

#[tokio::test]
async fn test_reads_stored_and_deflated_members() {
    let root = mount_tree(
        Arc::new(MemoryReader::new(sample_archive())),
        PermissionPolicy::default(),
    )
    .await;

    assert_eq!(&*read(&root, "a/b/c.txt").await.unwrap(), b"stored contents");
    assert_eq!(
        &*read(&root, "a/d.txt").await.unwrap(),
        &b"deflated ".repeat(200)[..]
    );
    assert!(read(&root, "x.txt").await.unwrap().is_empty());

    let attr = walk(&root, "a/d.txt").stat();
    assert_eq!(attr.size, 9 * 200);
    assert_eq!(attr.mode, 0o555);
}

#[tokio::test]
async fn test_archive_permission_policy() {
    let root = mount_tree(
        Arc::new(MemoryReader::new(sample_archive())),
        PermissionPolicy::Archive,
    )
    .await;

    assert_eq!(walk(&root, "bin/run.sh").stat().mode, 0o555);
    assert_eq!(walk(&root, "a/b/c.txt").stat().mode, 0o444);
}

#[tokio::test]
async fn test_archive_with_comment() {
    let data = build_zip(
        &[TestFile::stored("note.txt", b"with a comment")],
        b"archive comment, PK\x05\x06 included",
    );
    let root = mount_tree(Arc::new(MemoryReader::new(data)), PermissionPolicy::default()).await;
    assert_eq!(&*read(&root, "note.txt").await.unwrap(), b"with a comment");
}

#[tokio::test]
async fn test_empty_archive() {
    let root = mount_tree(
        Arc::new(MemoryReader::new(build_zip(&[], b""))),
        PermissionPolicy::default(),
    )
    .await;
    assert!(root.is_empty());
}

#[tokio::test]
async fn test_not_a_zip() {
    let reader = Arc::new(MemoryReader::new(b"definitely not a zip archive".to_vec()));
    let err = ZipArchive::open(reader).await.err().unwrap();
    assert!(err.to_string().contains("Not a valid ZIP file"));
}

#[tokio::test]
async fn test_corrupt_member_is_an_error() {
    let mut data = build_zip(&[TestFile::stored("data.bin", b"0123456789")], b"");
    // Local header is 30 bytes plus the 8-byte name.
    data[30 + 8 + 3] ^= 0xff;

    let root = mount_tree(Arc::new(MemoryReader::new(data)), PermissionPolicy::default()).await;
    let err = read(&root, "data.bin").await.unwrap_err();
    assert!(matches!(err, FsError::ChecksumMismatch { .. }));
    assert_eq!(err.path(), "data.bin");
}

#[tokio::test]
async fn test_stored_size_mismatch_is_rejected() {
    let mut data = build_zip(&[TestFile::stored("big.txt", b"abc")], b"");
    // Central header follows the 30-byte local header, name and data;
    // its uncompressed size field sits 24 bytes in.
    let size_field = 30 + 7 + 3 + 24;
    data[size_field..size_field + 4].copy_from_slice(&0x7fff_0000u32.to_le_bytes());

    let reader = Arc::new(CountingReader::new(data));
    let root = mount_tree(reader.clone(), PermissionPolicy::default()).await;
    assert_eq!(walk(&root, "big.txt").stat().size, 0x7fff_0000);
    let before = reader.reads();

    let err = read(&root, "big.txt").await.unwrap_err();
    assert!(matches!(err, FsError::Open { .. }));
    assert!(err.to_string().contains("declares"));
    assert_eq!(reader.reads(), before);
}

#[tokio::test]
async fn test_unsupported_members() {
    let mut bzip2 = TestFile::stored("packed.bz2", b"irrelevant");
    bzip2.method = 12;
    let mut encrypted = TestFile::stored("secret.txt", b"irrelevant");
    encrypted.flags = 0x0001;

    let data = build_zip(&[bzip2, encrypted], b"");
    let root = mount_tree(Arc::new(MemoryReader::new(data)), PermissionPolicy::default()).await;

    let err = read(&root, "packed.bz2").await.unwrap_err();
    assert!(matches!(err, FsError::Open { .. }));
    assert!(err.to_string().contains("Unsupported compression method 12"));

    let err = read(&root, "secret.txt").await.unwrap_err();
    assert!(err.to_string().contains("Encrypted entries are not supported"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_fetch_member_once() {
    let reader = Arc::new(CountingReader::new(sample_archive()));
    let root = mount_tree(reader.clone(), PermissionPolicy::default()).await;
    let file = Arc::clone(walk(&root, "a/d.txt").as_file().unwrap());
    let before = reader.reads();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let file = Arc::clone(&file);
            tokio::spawn(async move { file.data().await.unwrap() })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // One local header read plus one data read.
    assert_eq!(reader.reads() - before, 2);
    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));

    file.data().await.unwrap();
    assert_eq!(reader.reads() - before, 2);
}

#[tokio::test]
async fn test_local_file_archive() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&sample_archive()).unwrap();
    tmp.flush().unwrap();

    let reader = Arc::new(LocalFileReader::new(tmp.path()).unwrap());
    let root = mount_tree(reader, PermissionPolicy::default()).await;
    assert_eq!(&*read(&root, "a/b/c.txt").await.unwrap(), b"stored contents");
}
