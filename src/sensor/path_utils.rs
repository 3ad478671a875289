// src/sensor/path_utils.rs

//! Path helpers for turning event paths into dispatch metadata.

use std::path::{Path, PathBuf};

/// `path` relative to `root`, or `None` if it is not below `root`.
///
/// A direct `strip_prefix` is tried first. If that fails (symlinks, macOS
/// `/private/var` vs `/var`), both sides are canonicalized and tried again.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_path_buf());
        }
    }

    None
}

/// Directory of `path` relative to `root`, with forward slashes.
///
/// Files directly inside `root` give `"."`.
pub fn relative_subdir(root: &Path, path: &Path) -> Option<String> {
    let rel = relative_to(root, path)?;
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    if parent.as_os_str().is_empty() {
        Some(".".to_string())
    } else {
        Some(parent.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_in_root_has_dot_subdir() {
        assert_eq!(
            relative_subdir(Path::new("/in"), Path::new("/in/x.txt")).as_deref(),
            Some(".")
        );
    }

    #[test]
    fn nested_file_reports_its_directory() {
        assert_eq!(
            relative_subdir(Path::new("/in"), Path::new("/in/a/b/x.txt")).as_deref(),
            Some("a/b")
        );
    }

    #[test]
    fn unrelated_path_gives_none() {
        assert_eq!(relative_subdir(Path::new("/in"), Path::new("/elsewhere/x.txt")), None);
    }
}
