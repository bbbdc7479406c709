//! Lazily decompressed archive members.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use super::attr::Attr;
use super::entry::ArchiveEntry;
use crate::config::PermissionPolicy;
use crate::error::FsError;
use crate::units::format_size;

/// Outcome of the most recent failed population attempt
struct Failure {
    attempt: u64,
    error: FsError,
}

/// A file whose contents are decompressed on first read and kept for the
/// life of the mount.
///
/// Population runs under a per-file async mutex, so concurrent first readers
/// trigger a single decompression and all receive its result. Once
/// populated, reads go through a lock-free fast path and share one
/// `Arc<[u8]>`; the buffer is never mutated or dropped before the file.
///
/// A failed decompression leaves the cache empty. Readers that were queued
/// behind the failed attempt get its error; the next reader to arrive after
/// it starts a new attempt.
pub struct LazyFile {
    entry: Arc<dyn ArchiveEntry>,
    mode: u32,
    cache: OnceLock<Arc<[u8]>>,
    populate: Mutex<Option<Failure>>,
    failed_attempts: AtomicU64,
}

impl LazyFile {
    pub fn new(entry: Arc<dyn ArchiveEntry>) -> Self {
        Self::with_policy(entry, PermissionPolicy::default())
    }

    pub fn with_policy(entry: Arc<dyn ArchiveEntry>, policy: PermissionPolicy) -> Self {
        let mode = policy.file_mode(entry.permission_hint());
        Self {
            entry,
            mode,
            cache: OnceLock::new(),
            populate: Mutex::new(None),
            failed_attempts: AtomicU64::new(0),
        }
    }

    /// Archive path of the underlying entry
    pub fn path(&self) -> &str {
        self.entry.path()
    }

    pub fn size(&self) -> u64 {
        self.entry.uncompressed_size()
    }

    pub fn stat(&self) -> Attr {
        Attr::file(self.mode, self.size())
    }

    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Full uncompressed contents
    pub async fn data(&self) -> Result<Arc<[u8]>, FsError> {
        if let Some(data) = self.cache.get() {
            return Ok(Arc::clone(data));
        }

        let failures_seen = self.failed_attempts.load(Ordering::Acquire);
        let mut last_failure = self.populate.lock().await;

        if let Some(data) = self.cache.get() {
            return Ok(Arc::clone(data));
        }
        if let Some(failure) = last_failure.as_ref()
            && failure.attempt > failures_seen
        {
            return Err(failure.error.clone());
        }

        match self.decompress().await {
            Ok(bytes) => {
                let data: Arc<[u8]> = Arc::from(bytes);
                // Only set while holding `populate`, so this cannot race.
                let data = Arc::clone(self.cache.get_or_init(|| data));
                *last_failure = None;
                Ok(data)
            }
            Err(error) => {
                tracing::error!(path = self.path(), error = %error, "decompression failed");
                let attempt = self.failed_attempts.fetch_add(1, Ordering::AcqRel) + 1;
                *last_failure = Some(Failure {
                    attempt,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn decompress(&self) -> Result<Vec<u8>, FsError> {
        let path = self.path().to_string();
        let expected = self.entry.uncompressed_size();

        tracing::info!(
            path = %path,
            size = %format_size(expected),
            compressed = %format_size(self.entry.compressed_size()),
            "decompressing"
        );

        let stream = self
            .entry
            .open_stream()
            .await
            .map_err(|e| FsError::Open {
                path: path.clone(),
                message: format!("{:#}", e),
            })?;
        let crc32 = self.entry.crc32();

        // Inflating is CPU-bound; keep it off the async workers.
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || read_exact_len(stream, &task_path, expected, crc32))
            .await
            .map_err(|e| FsError::Io {
                path,
                message: format!("decompression task failed: {}", e),
            })?
    }
}

/// Read exactly `expected` bytes from `stream` and verify them
fn read_exact_len(
    mut stream: Box<dyn Read + Send>,
    path: &str,
    expected: u64,
    crc32: Option<u32>,
) -> Result<Vec<u8>, FsError> {
    let io_error = |e: std::io::Error| FsError::Io {
        path: path.to_string(),
        message: e.to_string(),
    };

    let len = usize::try_from(expected).map_err(|_| FsError::Io {
        path: path.to_string(),
        message: format!("{} bytes do not fit in memory", expected),
    })?;

    // Declared sizes are untrusted; one that cannot be allocated fails here.
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| FsError::Io {
        path: path.to_string(),
        message: format!("cannot allocate {}: {}", format_size(expected), e),
    })?;

    (&mut stream)
        .take(expected)
        .read_to_end(&mut buf)
        .map_err(io_error)?;
    if buf.len() < len {
        return Err(FsError::ShortRead {
            path: path.to_string(),
            expected,
            actual: buf.len() as u64,
        });
    }

    let mut probe = [0u8; 1];
    loop {
        match stream.read(&mut probe) {
            Ok(0) => break,
            Ok(_) => {
                return Err(FsError::TrailingData {
                    path: path.to_string(),
                    expected,
                });
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(io_error(e)),
        }
    }

    if let Some(expected_crc) = crc32 {
        let mut crc = flate2::Crc::new();
        crc.update(&buf);
        if crc.sum() != expected_crc {
            return Err(FsError::ChecksumMismatch {
                path: path.to_string(),
                expected: expected_crc,
                actual: crc.sum(),
            });
        }
    }

    Ok(buf)
}
