//! Directory scan producing the ordered work list for a batch.

use crate::descriptor;
use anyhow::{bail, Context, Result};
use shared::FileDescriptor;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions treated as movie files
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "divx", "flv", "iso", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ogm",
    "ts", "webm", "wmv",
];

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk `root` and describe every video file, sorted by path.
///
/// The root is canonicalized, so mapping keys are absolute whatever form
/// the caller typed.
pub fn scan_directory(root: impl AsRef<Path>) -> Result<Vec<FileDescriptor>> {
    let root = root.as_ref();
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("Failed to resolve {}", root.display()))?;
    let root = root.as_path();

    let mut descriptors = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && is_video(entry.path()) {
            debug!(path = %entry.path().display(), "Found video file");
            descriptors.push(descriptor::infer(entry.path()));
        }
    }

    info!(root = %root.display(), files = descriptors.len(), "Scan complete");
    Ok(descriptors)
}

/// Describe a single file under the same key a scan of its directory gives it.
///
/// Only the directory is canonicalized; the file name is kept as is, matching
/// the walk, which does not resolve symlinked files.
pub fn describe_file(path: impl AsRef<Path>) -> Result<FileDescriptor> {
    let path = path.as_ref();
    if !path.is_file() {
        bail!("Not a file: {}", path.display());
    }
    let name = path
        .file_name()
        .with_context(|| format!("No file name in {}", path.display()))?;
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    Ok(descriptor::infer(dir.join(name)))
}
