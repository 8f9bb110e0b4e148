//! Pack tree traversal: locating the pack root and listing its files

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use rpenc_core::{RpencError, RpencResult};

use crate::MANIFEST_FILE;

/// A regular file under the pack root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    /// Path relative to the pack root, forward-slash separated
    pub relative_path: String,
    pub path: PathBuf,
}

/// Find the directory holding the pack's `manifest.json`.
///
/// Depth-first over sorted entries; a directory's own `manifest.json` is
/// checked before any of its subdirectories, so an outer pack wins over packs
/// nested inside it.
pub fn find_pack_root(dir: &Path) -> RpencResult<Option<PathBuf>> {
    let candidate = dir.join(MANIFEST_FILE);
    if std::fs::symlink_metadata(&candidate).is_ok_and(|m| m.is_file()) {
        return Ok(Some(dir.to_path_buf()));
    }

    for sub in sorted_entries(dir)? {
        if sub.is_dir {
            if let Some(root) = find_pack_root(&sub.path)? {
                return Ok(Some(root));
            }
        }
    }
    Ok(None)
}

/// Collect every regular file under `root`, sorted by relative path.
///
/// Symlinks are neither followed nor included. A file or directory name that
/// is not valid UTF-8 cannot become a zip entry name and fails the walk.
pub fn collect_files(root: &Path) -> RpencResult<Vec<PackFile>> {
    let mut files = Vec::new();
    collect_files_inner(root, "", &mut files)?;
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path)); // deterministic order
    Ok(files)
}

fn collect_files_inner(dir: &Path, prefix: &str, out: &mut Vec<PackFile>) -> RpencResult<()> {
    for entry in sorted_entries(dir)? {
        if !entry.is_dir && !entry.is_file {
            continue;
        }
        let name = entry.name.to_str().ok_or_else(|| {
            RpencError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("file name is not valid UTF-8: {}", entry.path.display()),
            ))
        })?;
        let relative_path = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}/{name}")
        };

        if entry.is_dir {
            collect_files_inner(&entry.path, &relative_path, out)?;
        } else if entry.is_file {
            out.push(PackFile {
                relative_path,
                path: entry.path,
            });
        }
    }
    Ok(())
}

struct DirItem {
    name: OsString,
    path: PathBuf,
    is_dir: bool,
    is_file: bool,
}

fn sorted_entries(dir: &Path) -> RpencResult<Vec<DirItem>> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| io_context(e, "reading dir", dir))?;

    let mut items = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| io_context(e, "reading dir entry in", dir))?;
        // file_type() does not follow symlinks
        let file_type = entry
            .file_type()
            .map_err(|e| io_context(e, "stat", &entry.path()))?;
        items.push(DirItem {
            name: entry.file_name(),
            path: entry.path(),
            is_dir: file_type.is_dir(),
            is_file: file_type.is_file(),
        });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}

pub(crate) fn io_context(err: std::io::Error, what: &str, path: &Path) -> RpencError {
    RpencError::Io(std::io::Error::new(
        err.kind(),
        format!("{what} {}: {err}", path.display()),
    ))
}
