//! Zip archiver for build directories.
//!
//! Entries are stored relative to the source root (the root directory
//! itself is not a path segment) with `/` separators, deflated at level 9.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Archiver, PackagingError};

/// Maximum deflate level
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 9;

/// Archiver producing deflated zip files at the maximum level
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    compression_level: i64,
}

impl Default for ZipArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchiver {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    fn name(&self) -> &str {
        "zip"
    }

    async fn archive(&self, source: &Path, destination: &Path) -> Result<u64, PackagingError> {
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let level = self.compression_level;

        tokio::task::spawn_blocking(move || write_archive(&source, &destination, level))
            .await
            .map_err(|e| PackagingError::Aborted(e.to_string()))?
    }
}

/// Archive entry name for a path relative to the source root
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolved location of the archive being written, if its directory exists.
///
/// Used to keep a stale archive inside the source tree out of the new one,
/// however either path is spelled.
fn resolved_destination(destination: &Path) -> Option<PathBuf> {
    let name = destination.file_name()?;
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

fn write_archive(source: &Path, destination: &Path, level: i64) -> Result<u64, PackagingError> {
    let unreadable = |e| PackagingError::SourceUnreadable {
        path: source.to_path_buf(),
        source: e,
    };
    let metadata = std::fs::metadata(source).map_err(unreadable)?;
    if !metadata.is_dir() {
        return Err(PackagingError::SourceNotDirectory {
            path: source.to_path_buf(),
        });
    }
    let root = std::fs::canonicalize(source).map_err(unreadable)?;
    let excluded = resolved_destination(destination);

    // Collect before creating the destination so it can't end up inside itself
    let mut entries: Vec<(PathBuf, String, bool)> = Vec::new();
    for entry in WalkDir::new(&root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            continue;
        }
        if file_type.is_file() && excluded.is_some() {
            let resolved = std::fs::canonicalize(entry.path()).ok();
            if resolved == excluded {
                debug!(path = %entry.path().display(), "Skipping archive destination");
                continue;
            }
        }
        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        entries.push((entry.path().to_path_buf(), entry_name(relative), file_type.is_dir()));
    }

    if !entries.iter().any(|(_, _, is_dir)| !is_dir) {
        return Err(PackagingError::EmptySource {
            path: source.to_path_buf(),
        });
    }

    let destination_error = |e| PackagingError::Destination {
        path: destination.to_path_buf(),
        source: e,
    };
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(destination_error)?;
    }
    let file = File::create(destination).map_err(destination_error)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level));

    let mut zip = ZipWriter::new(file);
    for (path, name, is_dir) in entries {
        if is_dir {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name.clone(), options)?;
            let mut input = File::open(&path)?;
            std::io::copy(&mut input, &mut zip)?;
        }
        debug!(entry = %name, "Archived entry");
    }

    let file = zip.finish()?;
    Ok(file.metadata()?.len())
}
