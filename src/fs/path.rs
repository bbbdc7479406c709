//! Archive path normalization.

use thiserror::Error;

/// Why an archive path cannot be placed in the tree
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    #[error("path has no segments")]
    Empty,

    #[error("path escapes the archive root")]
    EscapesRoot,
}

/// Normalize an archive path into `/`-joined segments
///
/// Empty and `.` segments are dropped, a leading `/` is ignored, and `..`
/// removes the previous segment. A `..` with nothing left to remove would
/// leave the root and is rejected. Backslashes are ordinary characters.
pub fn normalize(path: &str) -> Result<String, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::EscapesRoot);
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}
