// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path, PathBuf};

use crate::errors::{Result, WatchError};

/// Express `path` relative to `root`.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// Returns `None` if the path cannot be related to `root`. Deleted paths
/// cannot be canonicalized, so for them only the direct form works.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }

    // macOS hands out `/private/var/...` for `/var/...` and similar.
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_path_buf());
        }
    }

    None
}

/// Render a relative path with forward slashes, independent of platform.
pub fn to_slash_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Resolve a caller-supplied location path to a path relative to `base`.
///
/// Absolute paths must live under `base`; relative paths are taken to be
/// relative to `base` already. `.` components are dropped and `..` is
/// resolved lexically, failing if it climbs above `base`.
pub fn resolve_location(base: &Path, path: &Path) -> Result<PathBuf> {
    let outside = || WatchError::OutsideBase {
        path: path.to_path_buf(),
        base: base.to_path_buf(),
    };

    let relative = if path.is_absolute() {
        relative_to(base, path).ok_or_else(outside)?
    } else {
        path.to_path_buf()
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => normalized.push(name),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(outside());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }

    Ok(normalized)
}
